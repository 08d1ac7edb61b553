use serde::{Deserialize, Serialize};

use crate::memory::StringLayout;

/// Declares one section of the offset table: a flat set of named byte
/// displacements with per-build default values.
macro_rules! offset_section {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$field_meta:meta])* $field:ident = $value:expr ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct $name {
            $( $(#[$field_meta])* pub $field: u64, )*
        }

        impl Default for $name {
            fn default() -> Self {
                Self { $( $field: $value, )* }
            }
        }
    };
}

offset_section! {
    /// Generic instance header shared by every node in the tree
    InstanceOffsets {
        /// Pointer to the name string header
        name = 0x80,
        parent = 0x50,
        /// Pointer to the child list record
        children_start = 0x60,
        /// Displacement of the end cursor inside the child list record
        children_end = 0x8,
        class_descriptor = 0x18,
        /// Pointer to the class name string, inside the class descriptor
        class_name = 0x8,
    }
}

offset_section! {
    BasePartOffsets {
        /// Pointer to the physics primitive holding the transform
        primitive = 0x148,
        position = 0x11c,
        rotation = 0xf8,
        size = 0x1cc,
        transparency = 0xf0,
        linear_velocity = 0x128,
    }
}

offset_section! {
    HumanoidOffsets {
        health = 0x194,
        max_health = 0x1b4,
        rig_type = 0x1c8,
        walk_speed = 0x1d4,
        hip_height = 0x1a0,
        jump_power = 0x1b0,
    }
}

offset_section! {
    PlayerOffsets {
        /// Character model
        model_instance = 0x360,
        team = 0x270,
        user_id = 0x298,
        display_name = 0x130,
    }
}

offset_section! {
    PlayersOffsets {
        local_player = 0x130,
    }
}

offset_section! {
    TeamOffsets {
        brick_color = 0xd0,
    }
}

offset_section! {
    ModelOffsets {
        primary_part = 0x248,
    }
}

offset_section! {
    CameraOffsets {
        position = 0x11c,
        rotation = 0xf8,
        field_of_view = 0x160,
    }
}

offset_section! {
    WorkspaceOffsets {
        current_camera = 0x410,
    }
}

offset_section! {
    DataModelOffsets {
        /// Module-relative address of the fake data model pointer
        fake_pointer = 0x73a_7088,
        /// Real data model, inside the fake one
        real_data_model = 0x1c0,
        workspace = 0x178,
        place_id = 0x198,
        game_id = 0x190,
    }
}

/// Field offset table for one remote build.
///
/// Loaded once before any traversal and never mutated during a run. A table
/// that does not match the running build produces silently wrong data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffsetTable {
    pub version: String,
    pub string: StringLayout,
    pub instance: InstanceOffsets,
    pub base_part: BasePartOffsets,
    pub humanoid: HumanoidOffsets,
    pub player: PlayerOffsets,
    pub players: PlayersOffsets,
    pub team: TeamOffsets,
    pub model: ModelOffsets,
    pub camera: CameraOffsets,
    pub workspace: WorkspaceOffsets,
    pub data_model: DataModelOffsets,
}

impl Default for OffsetTable {
    fn default() -> Self {
        Self {
            version: "version-4aeb17bd13994560".to_string(),
            string: StringLayout::default(),
            instance: InstanceOffsets::default(),
            base_part: BasePartOffsets::default(),
            humanoid: HumanoidOffsets::default(),
            player: PlayerOffsets::default(),
            players: PlayersOffsets::default(),
            team: TeamOffsets::default(),
            model: ModelOffsets::default(),
            camera: CameraOffsets::default(),
            workspace: WorkspaceOffsets::default(),
            data_model: DataModelOffsets::default(),
        }
    }
}

impl OffsetTable {
    /// Check the fields every traversal depends on are set
    pub fn is_valid(&self) -> bool {
        !self.version.is_empty()
            && self.instance.name != 0
            && self.instance.children_start != 0
            && self.instance.class_descriptor != 0
            && self.string.max_length > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(OffsetTable::default().is_valid());
    }

    #[test]
    fn test_missing_version_is_invalid() {
        let table = OffsetTable {
            version: String::new(),
            ..OffsetTable::default()
        };
        assert!(!table.is_valid());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let table: OffsetTable = serde_json::from_str(
            r#"{ "version": "version-test", "humanoid": { "health": 400 } }"#,
        )
        .unwrap();

        assert_eq!(table.version, "version-test");
        assert_eq!(table.humanoid.health, 400);
        assert_eq!(table.humanoid.max_health, 0x1b4);
        assert_eq!(table.instance, InstanceOffsets::default());
        assert_eq!(table.string.max_length, 255);
    }
}
