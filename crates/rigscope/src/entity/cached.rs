use std::collections::HashMap;

use serde::Serialize;

use super::rig::{R6Parts, R15Parts};
use crate::instance::{InstanceId, RigKind};
use crate::math::Vector3;

/// Tool held by a character
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolInfo {
    pub id: InstanceId,
    pub name: String,
}

/// Immutable per-tick view of one tracked subject.
///
/// Identity across ticks is the character address ([`CachedEntity::key`]),
/// not any content field. `PartialEq` compares every field, floats by bit
/// pattern, so garbage NaNs read from the remote still compare equal.
#[derive(Debug, Clone, Serialize)]
pub struct CachedEntity {
    pub character: InstanceId,
    pub player: InstanceId,
    pub name: String,
    pub team: InstanceId,
    pub local_player: bool,
    pub humanoid: InstanceId,
    pub rig_kind: Option<RigKind>,
    pub health: f32,
    pub max_health: f32,
    /// Position of `HumanoidRootPart`, if present
    pub root_position: Option<Vector3>,
    /// Distance from the builder's viewpoint to the root part
    pub distance: Option<f32>,
    pub r15: R15Parts,
    pub r6: R6Parts,
    pub tool: Option<ToolInfo>,
    /// Every non-null child of the character at snapshot time
    pub children: Vec<InstanceId>,
}

impl PartialEq for CachedEntity {
    fn eq(&self, other: &Self) -> bool {
        self.character == other.character
            && self.player == other.player
            && self.name == other.name
            && self.team == other.team
            && self.local_player == other.local_player
            && self.humanoid == other.humanoid
            && self.rig_kind == other.rig_kind
            && self.health.to_bits() == other.health.to_bits()
            && self.max_health.to_bits() == other.max_health.to_bits()
            && self.root_position.map(|p| p.to_bits())
                == other.root_position.map(|p| p.to_bits())
            && self.distance.map(f32::to_bits) == other.distance.map(f32::to_bits)
            && self.r15 == other.r15
            && self.r6 == other.r6
            && self.tool == other.tool
            && self.children == other.children
    }
}

/// The part table matching an entity's rig kind
#[derive(Debug, Clone, Copy)]
pub enum ActiveRig<'a> {
    R15(&'a R15Parts),
    R6(&'a R6Parts),
}

impl CachedEntity {
    pub fn new(character: InstanceId) -> Self {
        Self {
            character,
            player: InstanceId::NULL,
            name: String::new(),
            team: InstanceId::NULL,
            local_player: false,
            humanoid: InstanceId::NULL,
            rig_kind: None,
            health: 0.0,
            max_health: 0.0,
            root_position: None,
            distance: None,
            r15: R15Parts::default(),
            r6: R6Parts::default(),
            tool: None,
            children: Vec::new(),
        }
    }

    /// Change-detection key: the character address
    pub fn key(&self) -> InstanceId {
        self.character
    }

    pub fn same_subject(&self, other: &CachedEntity) -> bool {
        self.character == other.character
    }

    pub fn has_character(&self) -> bool {
        !self.character.is_null()
    }

    pub fn is_alive(&self) -> bool {
        !self.humanoid.is_null() && self.health > 0.0
    }

    pub fn root_part(&self) -> InstanceId {
        self.r15.humanoid_root_part()
    }

    /// Part table chosen by rig kind, falling back to whichever table
    /// resolved more slots when the rig kind is unknown
    pub fn active_rig(&self) -> ActiveRig<'_> {
        match self.rig_kind {
            Some(RigKind::R15) => ActiveRig::R15(&self.r15),
            Some(RigKind::R6) => ActiveRig::R6(&self.r6),
            None if self.r6.resolved() > self.r15.resolved() => ActiveRig::R6(&self.r6),
            None => ActiveRig::R15(&self.r15),
        }
    }
}

/// Every entity built in one tick
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    pub entities: Vec<CachedEntity>,
}

/// Subjects that appeared, disappeared or changed between two snapshots.
///
/// Entities without a character have no identity and are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub joined: Vec<InstanceId>,
    pub left: Vec<InstanceId>,
    pub changed: Vec<InstanceId>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty() && self.changed.is_empty()
    }
}

impl Snapshot {
    pub fn new(tick: u64, entities: Vec<CachedEntity>) -> Self {
        Self { tick, entities }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, key: InstanceId) -> Option<&CachedEntity> {
        if key.is_null() {
            return None;
        }
        self.entities.iter().find(|entity| entity.key() == key)
    }

    pub fn local_player(&self) -> Option<&CachedEntity> {
        self.entities.iter().find(|entity| entity.local_player)
    }

    pub fn diff(&self, previous: &Snapshot) -> SnapshotDiff {
        let before: HashMap<InstanceId, &CachedEntity> = previous
            .entities
            .iter()
            .filter(|entity| entity.has_character())
            .map(|entity| (entity.key(), entity))
            .collect();

        let mut diff = SnapshotDiff::default();
        for entity in self.entities.iter().filter(|e| e.has_character()) {
            match before.get(&entity.key()) {
                None => diff.joined.push(entity.key()),
                Some(old) if *old != entity => diff.changed.push(entity.key()),
                Some(_) => {}
            }
        }
        diff.left = previous
            .entities
            .iter()
            .filter(|entity| entity.has_character() && self.get(entity.key()).is_none())
            .map(CachedEntity::key)
            .collect();

        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::rig::{R6Part, R15Part};

    fn entity(character: u64, health: f32) -> CachedEntity {
        let mut entity = CachedEntity::new(InstanceId(character));
        entity.humanoid = InstanceId(character + 0x10);
        entity.health = health;
        entity
    }

    #[test]
    fn test_identity_is_character_address() {
        let a = entity(0x1000, 100.0);
        let b = entity(0x1000, 5.0);
        assert!(a.same_subject(&b));
        assert_ne!(a, b);
        assert!(!a.same_subject(&entity(0x2000, 100.0)));
    }

    #[test]
    fn test_nan_fields_compare_by_bits() {
        let mut a = entity(0x1000, f32::from_bits(0x7fc0_0000));
        a.distance = Some(f32::NAN);
        a.root_position = Some(Vector3::new(f32::NAN, 0.0, 1.0));
        let b = a.clone();
        assert_eq!(a, b);

        let previous = Snapshot::new(1, vec![a]);
        let current = Snapshot::new(2, vec![b]);
        assert!(current.diff(&previous).is_empty());

        // A different NaN payload is a different reading
        let c = entity(0x1000, f32::from_bits(0x7fc0_0001));
        assert_ne!(previous.entities[0], c);
    }

    #[test]
    fn test_is_alive() {
        assert!(entity(0x1000, 1.0).is_alive());
        assert!(!entity(0x1000, 0.0).is_alive());
        assert!(!CachedEntity::new(InstanceId(0x1000)).is_alive());
    }

    #[test]
    fn test_active_rig() {
        let mut e = entity(0x1000, 100.0);
        e.r6.fill(R6Part::Torso, InstanceId(0x50));
        assert!(matches!(e.active_rig(), ActiveRig::R6(_)));

        e.r15.fill(R15Part::UpperTorso, InstanceId(0x60));
        e.r15.fill(R15Part::LowerTorso, InstanceId(0x70));
        assert!(matches!(e.active_rig(), ActiveRig::R15(_)));

        e.rig_kind = Some(RigKind::R6);
        assert!(matches!(e.active_rig(), ActiveRig::R6(_)));
    }

    #[test]
    fn test_diff() {
        let previous = Snapshot::new(
            1,
            vec![entity(0x1000, 100.0), entity(0x2000, 100.0), entity(0x3000, 50.0)],
        );
        let current = Snapshot::new(
            2,
            vec![
                entity(0x1000, 100.0),
                entity(0x3000, 40.0),
                entity(0x4000, 100.0),
                CachedEntity::new(InstanceId::NULL),
            ],
        );

        let diff = current.diff(&previous);
        assert_eq!(diff.joined, vec![InstanceId(0x4000)]);
        assert_eq!(diff.left, vec![InstanceId(0x2000)]);
        assert_eq!(diff.changed, vec![InstanceId(0x3000)]);
        assert!(current.diff(&current).is_empty());
    }

    #[test]
    fn test_get_ignores_null_key() {
        let snapshot = Snapshot::new(1, vec![CachedEntity::new(InstanceId::NULL)]);
        assert!(snapshot.get(InstanceId::NULL).is_none());
        assert_eq!(snapshot.len(), 1);
    }
}
