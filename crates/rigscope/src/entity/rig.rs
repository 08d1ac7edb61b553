//! Archetype tables: the child names expected under a character, mapped to
//! fixed slots.

use serde::ser::{Serialize, SerializeMap, Serializer};
use strum::{EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::instance::InstanceId;

/// Name of the humanoid controller child
pub const HUMANOID: &str = "Humanoid";

/// R15 body parts, serialized by their canonical child names
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr, EnumIter, EnumCount,
)]
pub enum R15Part {
    Head,
    HumanoidRootPart,
    UpperTorso,
    LowerTorso,
    LeftUpperArm,
    LeftLowerArm,
    LeftHand,
    RightUpperArm,
    RightLowerArm,
    RightHand,
    LeftUpperLeg,
    LeftLowerLeg,
    LeftFoot,
    RightUpperLeg,
    RightLowerLeg,
    RightFoot,
}

/// R6 body parts, serialized by their canonical child names
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr, EnumIter, EnumCount,
)]
pub enum R6Part {
    Head,
    HumanoidRootPart,
    Torso,
    #[strum(serialize = "Left Arm")]
    LeftArm,
    #[strum(serialize = "Right Arm")]
    RightArm,
    #[strum(serialize = "Left Leg")]
    LeftLeg,
    #[strum(serialize = "Right Leg")]
    RightLeg,
}

macro_rules! part_table {
    ($(#[$meta:meta])* $table:ident, $part:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $table {
            slots: [InstanceId; $part::COUNT],
        }

        impl Default for $table {
            fn default() -> Self {
                Self {
                    slots: [InstanceId::NULL; $part::COUNT],
                }
            }
        }

        impl $table {
            /// Map a child name onto its slot
            pub fn classify(name: &str) -> Option<$part> {
                name.parse().ok()
            }

            pub fn get(&self, part: $part) -> InstanceId {
                self.slots[part as usize]
            }

            /// Fill an empty slot; the first child with a given name wins
            pub fn fill(&mut self, part: $part, id: InstanceId) -> bool {
                let slot = &mut self.slots[part as usize];
                if !slot.is_null() {
                    return false;
                }
                *slot = id;
                true
            }

            pub fn iter(&self) -> impl Iterator<Item = ($part, InstanceId)> + '_ {
                $part::iter().map(move |part| (part, self.get(part)))
            }

            /// Number of slots holding a non-null reference
            pub fn resolved(&self) -> usize {
                self.slots.iter().filter(|id| !id.is_null()).count()
            }

            pub fn is_complete(&self) -> bool {
                self.resolved() == $part::COUNT
            }

            pub fn head(&self) -> InstanceId {
                self.get($part::Head)
            }

            pub fn humanoid_root_part(&self) -> InstanceId {
                self.get($part::HumanoidRootPart)
            }
        }

        impl Serialize for $table {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some($part::COUNT))?;
                for (part, id) in self.iter() {
                    let name: &'static str = part.into();
                    map.serialize_entry(name, &id)?;
                }
                map.end()
            }
        }
    };
}

part_table! {
    /// Resolved R15 parts of one character
    R15Parts, R15Part
}

part_table! {
    /// Resolved R6 parts of one character
    R6Parts, R6Part
}

impl R15Parts {
    pub fn upper_torso(&self) -> InstanceId {
        self.get(R15Part::UpperTorso)
    }

    pub fn lower_torso(&self) -> InstanceId {
        self.get(R15Part::LowerTorso)
    }
}

impl R6Parts {
    pub fn torso(&self) -> InstanceId {
        self.get(R6Part::Torso)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_canonical_names() {
        assert_eq!(R15Parts::classify("UpperTorso"), Some(R15Part::UpperTorso));
        assert_eq!(R15Parts::classify("Torso"), None);
        assert_eq!(R6Parts::classify("Left Arm"), Some(R6Part::LeftArm));
        assert_eq!(R6Parts::classify("LeftArm"), None);
        assert_eq!(R6Parts::classify("Head"), Some(R6Part::Head));
        assert_eq!(R15Parts::classify("head"), None);
    }

    #[test]
    fn test_first_fill_wins() {
        let mut table = R15Parts::default();
        assert!(table.fill(R15Part::Head, InstanceId(0x10)));
        assert!(!table.fill(R15Part::Head, InstanceId(0x20)));
        assert_eq!(table.head(), InstanceId(0x10));
        assert_eq!(table.resolved(), 1);
        assert!(!table.is_complete());
    }

    #[test]
    fn test_iter_covers_every_slot() {
        let table = R6Parts::default();
        assert_eq!(table.iter().count(), R6Part::COUNT);
        assert!(table.iter().all(|(_, id)| id.is_null()));
    }

    #[test]
    fn test_serializes_by_name() {
        let mut table = R6Parts::default();
        table.fill(R6Part::RightLeg, InstanceId(0xABC));
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["Right Leg"], 0xABC);
        assert_eq!(json["Torso"], 0);
    }
}
