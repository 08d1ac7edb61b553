//! Archetype views: typed wrappers that expose only the fields valid for a
//! class, obtained through [`Instance::cast`] after a class-name check.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use strum::{Display, FromRepr, IntoStaticStr};

use super::Instance;
use crate::math::{Matrix3, Vector3};
use crate::memory::MemoryAccess;

pub(crate) mod sealed {
    use crate::instance::Instance;

    pub trait Wrap<'r, M>: Sized {
        fn wrap(instance: Instance<'r, M>) -> Self;
    }
}

/// A class-checked view of an [`Instance`]
pub trait Archetype<'r, M: MemoryAccess>: sealed::Wrap<'r, M> {
    /// Class names this view accepts
    const CLASS_NAMES: &'static [&'static str];

    fn instance(&self) -> Instance<'r, M>;

    fn matches(class_name: &str) -> bool {
        Self::CLASS_NAMES.contains(&class_name)
    }
}

macro_rules! archetype {
    ($(#[$meta:meta])* $name:ident => [$($class:literal),+ $(,)?]) => {
        $(#[$meta])*
        pub struct $name<'r, M>(Instance<'r, M>);

        impl<M> Clone for $name<'_, M> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<M> Copy for $name<'_, M> {}

        impl<M> PartialEq for $name<'_, M> {
            fn eq(&self, other: &Self) -> bool {
                self.0 == other.0
            }
        }

        impl<M> Eq for $name<'_, M> {}

        impl<M> fmt::Debug for $name<'_, M> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.0.id).finish()
            }
        }

        impl<'r, M: MemoryAccess> sealed::Wrap<'r, M> for $name<'r, M> {
            fn wrap(instance: Instance<'r, M>) -> Self {
                Self(instance)
            }
        }

        impl<'r, M: MemoryAccess> Archetype<'r, M> for $name<'r, M> {
            const CLASS_NAMES: &'static [&'static str] = &[$($class),+];

            fn instance(&self) -> Instance<'r, M> {
                self.0
            }
        }

        impl<'r, M> Deref for $name<'r, M> {
            type Target = Instance<'r, M>;

            fn deref(&self) -> &Instance<'r, M> {
                &self.0
            }
        }
    };
}

/// Humanoid rig layout
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, FromRepr, IntoStaticStr, Display,
)]
#[repr(u8)]
pub enum RigKind {
    R6 = 0,
    R15 = 1,
}

archetype! {
    /// Any physical part
    BasePart => [
        "Part",
        "MeshPart",
        "UnionOperation",
        "WedgePart",
        "CornerWedgePart",
        "TrussPart",
        "Seat",
        "VehicleSeat",
        "SpawnLocation",
    ]
}

impl<'r, M: MemoryAccess> BasePart<'r, M> {
    /// Physics primitive carrying the part's transform
    pub fn primitive(&self) -> Primitive<'r, M> {
        Primitive {
            owner: self.0,
            address: self.0.read::<u64>(self.0.offsets().base_part.primitive),
        }
    }

    /// World position, read through the primitive pointer (two reads)
    pub fn position(&self) -> Vector3 {
        self.primitive().position()
    }

    /// Rotation matrix, read through the primitive pointer (two reads)
    pub fn rotation(&self) -> Matrix3 {
        self.primitive().rotation()
    }

    /// Extents, read through the primitive pointer (two reads)
    pub fn size(&self) -> Vector3 {
        self.primitive().size()
    }

    pub fn transparency(&self) -> f32 {
        self.0.read(self.0.offsets().base_part.transparency)
    }
}

/// Physics primitive of a [`BasePart`]; not itself an instance
pub struct Primitive<'r, M> {
    owner: Instance<'r, M>,
    address: u64,
}

impl<M> Clone for Primitive<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Primitive<'_, M> {}

impl<M: MemoryAccess> Primitive<'_, M> {
    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn is_null(&self) -> bool {
        self.address == 0
    }

    fn read<T: bytemuck::Pod>(&self, offset: u64) -> T {
        if self.address == 0 {
            return <T as bytemuck::Zeroable>::zeroed();
        }
        self.owner
            .remote
            .reader
            .read(self.address.wrapping_add(offset))
    }

    pub fn position(&self) -> Vector3 {
        self.read(self.owner.offsets().base_part.position)
    }

    pub fn rotation(&self) -> Matrix3 {
        self.read(self.owner.offsets().base_part.rotation)
    }

    pub fn size(&self) -> Vector3 {
        self.read(self.owner.offsets().base_part.size)
    }

    pub fn linear_velocity(&self) -> Vector3 {
        self.read(self.owner.offsets().base_part.linear_velocity)
    }
}

archetype! {
    Humanoid => ["Humanoid"]
}

impl<M: MemoryAccess> Humanoid<'_, M> {
    pub fn health(&self) -> f32 {
        self.0.read(self.0.offsets().humanoid.health)
    }

    pub fn max_health(&self) -> f32 {
        self.0.read(self.0.offsets().humanoid.max_health)
    }

    /// Rig layout, or `None` for an unrecognized value
    pub fn rig_kind(&self) -> Option<RigKind> {
        RigKind::from_repr(self.0.read::<u8>(self.0.offsets().humanoid.rig_type))
    }

    pub fn walk_speed(&self) -> f32 {
        self.0.read(self.0.offsets().humanoid.walk_speed)
    }

    pub fn hip_height(&self) -> f32 {
        self.0.read(self.0.offsets().humanoid.hip_height)
    }

    pub fn jump_power(&self) -> f32 {
        self.0.read(self.0.offsets().humanoid.jump_power)
    }
}

archetype! {
    Player => ["Player"]
}

impl<'r, M: MemoryAccess> Player<'r, M> {
    /// Character model; null while the player has not spawned
    pub fn character(&self) -> Instance<'r, M> {
        self.0.read_instance(self.0.offsets().player.model_instance)
    }

    /// Team instance; null when unassigned
    pub fn team(&self) -> Instance<'r, M> {
        self.0.read_instance(self.0.offsets().player.team)
    }

    pub fn user_id(&self) -> i64 {
        self.0.read(self.0.offsets().player.user_id)
    }

    pub fn display_name(&self) -> String {
        self.0.read_inline_string(self.0.offsets().player.display_name)
    }
}

archetype! {
    /// The `Players` service
    Players => ["Players"]
}

impl<'r, M: MemoryAccess> Players<'r, M> {
    pub fn local_player(&self) -> Instance<'r, M> {
        self.0.read_instance(self.0.offsets().players.local_player)
    }

    /// Children that are players
    pub fn players(&self) -> Vec<Player<'r, M>> {
        self.0
            .children()
            .into_iter()
            .filter_map(|child| child.cast::<Player<'r, M>>())
            .collect()
    }
}

archetype! {
    Team => ["Team"]
}

impl<M: MemoryAccess> Team<'_, M> {
    pub fn brick_color(&self) -> i32 {
        self.0.read(self.0.offsets().team.brick_color)
    }
}

archetype! {
    Model => ["Model"]
}

impl<'r, M: MemoryAccess> Model<'r, M> {
    pub fn primary_part(&self) -> Instance<'r, M> {
        self.0.read_instance(self.0.offsets().model.primary_part)
    }
}

archetype! {
    Camera => ["Camera"]
}

impl<M: MemoryAccess> Camera<'_, M> {
    pub fn position(&self) -> Vector3 {
        self.0.read(self.0.offsets().camera.position)
    }

    pub fn rotation(&self) -> Matrix3 {
        self.0.read(self.0.offsets().camera.rotation)
    }

    pub fn field_of_view(&self) -> f32 {
        self.0.read(self.0.offsets().camera.field_of_view)
    }
}

archetype! {
    Workspace => ["Workspace"]
}

impl<'r, M: MemoryAccess> Workspace<'r, M> {
    pub fn current_camera(&self) -> Instance<'r, M> {
        self.0.read_instance(self.0.offsets().workspace.current_camera)
    }
}

archetype! {
    DataModel => ["DataModel"]
}

impl<'r, M: MemoryAccess> DataModel<'r, M> {
    pub fn workspace(&self) -> Instance<'r, M> {
        self.0.read_instance(self.0.offsets().data_model.workspace)
    }

    pub fn place_id(&self) -> i64 {
        self.0.read(self.0.offsets().data_model.place_id)
    }

    pub fn game_id(&self) -> i64 {
        self.0.read(self.0.offsets().data_model.game_id)
    }
}

archetype! {
    Tool => ["Tool"]
}
