use tracing::trace;

use super::cached::{CachedEntity, ToolInfo};
use super::rig::{HUMANOID, R6Parts, R15Parts};
use crate::instance::{BasePart, Humanoid, Instance, InstanceId, Player, Players, Remote, Tool};
use crate::math::Vector3;
use crate::memory::MemoryAccess;

/// Builds one [`CachedEntity`] per subject for the current tick.
///
/// Missing children leave null slots; nothing here fails.
pub struct SnapshotBuilder<'r, M> {
    remote: Remote<'r, M>,
    viewpoint: Option<Vector3>,
    local_player: InstanceId,
}

impl<'r, M: MemoryAccess> SnapshotBuilder<'r, M> {
    pub fn new(remote: Remote<'r, M>) -> Self {
        Self {
            remote,
            viewpoint: None,
            local_player: InstanceId::NULL,
        }
    }

    /// Reference point for [`CachedEntity::distance`]
    pub fn viewpoint(mut self, viewpoint: Vector3) -> Self {
        self.viewpoint = Some(viewpoint);
        self
    }

    pub fn local_player(mut self, local_player: InstanceId) -> Self {
        self.local_player = local_player;
        self
    }

    /// One entity per player under the `Players` service
    pub fn build_all(&self, players: &Players<'r, M>) -> Vec<CachedEntity> {
        players
            .players()
            .into_iter()
            .map(|player| self.build_player(&player))
            .collect()
    }

    pub fn build_player(&self, player: &Player<'r, M>) -> CachedEntity {
        let mut entity = self.build_character(player.character());
        entity.player = player.id();
        entity.name = player.name();
        entity.team = player.team().id();
        entity.local_player = !self.local_player.is_null() && player.id() == self.local_player;
        entity
    }

    /// Classify the children of a character root in a single walk
    pub fn build_character(&self, character: Instance<'r, M>) -> CachedEntity {
        let mut entity = CachedEntity::new(character.id());
        if character.is_null() {
            return entity;
        }
        entity.name = character.name();

        for child in character.children() {
            if child.is_null() {
                continue;
            }
            entity.children.push(child.id());

            let name = child.name();
            let r15 = R15Parts::classify(&name).map(|part| entity.r15.fill(part, child.id()));
            let r6 = R6Parts::classify(&name).map(|part| entity.r6.fill(part, child.id()));
            if r15.is_some() || r6.is_some() {
                continue;
            }

            if name == HUMANOID {
                if entity.humanoid.is_null() {
                    match child.cast::<Humanoid<'r, M>>() {
                        Some(humanoid) => {
                            entity.humanoid = humanoid.id();
                            entity.rig_kind = humanoid.rig_kind();
                            entity.health = humanoid.health();
                            entity.max_health = humanoid.max_health();
                        }
                        None => trace!("{} named {} is not a humanoid", child.id(), HUMANOID),
                    }
                }
            } else if entity.tool.is_none() && child.cast::<Tool<'r, M>>().is_some() {
                entity.tool = Some(ToolInfo {
                    id: child.id(),
                    name,
                });
            }
        }

        let root = entity.root_part();
        if let Some(part) = self.remote.instance(root).cast::<BasePart<'r, M>>() {
            let position = part.position();
            entity.root_position = Some(position);
            entity.distance = self.viewpoint.map(|viewpoint| viewpoint.distance(&position));
        }

        entity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Snapshot;
    use crate::entity::rig::{R6Part, R15Part};
    use crate::instance::RigKind;
    use crate::memory::{MemoryReader, MockScene};
    use crate::offset::OffsetTable;

    fn humanoid(scene: &mut MockScene, character: u64, rig: u8, health: f32, max: f32) -> u64 {
        let humanoid = scene.add_child(character, HUMANOID, "Humanoid");
        let layout = scene.offsets().humanoid;
        scene.write(humanoid + layout.rig_type, rig);
        scene.write(humanoid + layout.health, health);
        scene.write(humanoid + layout.max_health, max);
        humanoid
    }

    #[test]
    fn test_r15_character() {
        let mut scene = MockScene::new(OffsetTable::default());
        let character = scene.instance("alice", "Model");
        let head = scene.add_child(character, "Head", "MeshPart");
        let upper = scene.add_child(character, "UpperTorso", "MeshPart");
        let hum = humanoid(&mut scene, character, 1, 80.0, 100.0);
        let offsets = scene.offsets().clone();
        let reader = MemoryReader::new(scene.into_memory());
        let remote = Remote::new(&reader, &offsets);

        let entity = SnapshotBuilder::new(remote).build_character(remote.instance(character));

        assert_eq!(entity.key(), InstanceId(character));
        assert_eq!(entity.name, "alice");
        assert_eq!(entity.r15.head(), InstanceId(head));
        assert_eq!(entity.r15.upper_torso(), InstanceId(upper));
        assert_eq!(entity.r15.resolved(), 2);
        assert_eq!(entity.humanoid, InstanceId(hum));
        assert_eq!(entity.rig_kind, Some(RigKind::R15));
        assert_eq!(entity.health, 80.0);
        assert_eq!(entity.max_health, 100.0);
        assert_eq!(entity.children.len(), 3);
        // Head is shared by both archetypes
        assert_eq!(entity.r6.head(), InstanceId(head));
        assert_eq!(entity.r6.resolved(), 1);
        assert!(entity.root_position.is_none());
        assert!(entity.distance.is_none());
    }

    #[test]
    fn test_nan_health_rebuilds_equal() {
        let mut scene = MockScene::new(OffsetTable::default());
        let character = scene.instance("eve", "Model");
        humanoid(&mut scene, character, 1, f32::from_bits(0x7fc0_0000), 100.0);
        let offsets = scene.offsets().clone();
        let reader = MemoryReader::new(scene.into_memory());
        let remote = Remote::new(&reader, &offsets);
        let builder = SnapshotBuilder::new(remote);

        let first = builder.build_character(remote.instance(character));
        let second = builder.build_character(remote.instance(character));
        assert!(first.health.is_nan());
        assert_eq!(first, second);

        let previous = Snapshot::new(1, vec![first]);
        let current = Snapshot::new(2, vec![second]);
        assert!(current.diff(&previous).is_empty());
    }

    #[test]
    fn test_r6_character_with_spaced_names() {
        let mut scene = MockScene::new(OffsetTable::default());
        let character = scene.instance("bob", "Model");
        let torso = scene.add_child(character, "Torso", "Part");
        let arm = scene.add_child(character, "Left Arm", "Part");
        humanoid(&mut scene, character, 0, 100.0, 100.0);
        let offsets = scene.offsets().clone();
        let reader = MemoryReader::new(scene.into_memory());
        let remote = Remote::new(&reader, &offsets);

        let entity = SnapshotBuilder::new(remote).build_character(remote.instance(character));

        assert_eq!(entity.rig_kind, Some(RigKind::R6));
        assert_eq!(entity.r6.torso(), InstanceId(torso));
        assert_eq!(entity.r6.get(R6Part::LeftArm), InstanceId(arm));
        assert_eq!(entity.r15.resolved(), 0);
    }

    #[test]
    fn test_null_character_still_produces_entity() {
        let offsets = OffsetTable::default();
        let reader = MemoryReader::new(crate::memory::MockMemory::new());
        let remote = Remote::new(&reader, &offsets);

        let entity = SnapshotBuilder::new(remote).build_character(remote.instance(0u64));
        assert!(!entity.has_character());
        assert!(entity.children.is_empty());
        assert_eq!(entity.health, 0.0);
    }

    #[test]
    fn test_humanoid_name_with_wrong_class_is_ignored() {
        let mut scene = MockScene::new(OffsetTable::default());
        let character = scene.instance("carol", "Model");
        scene.add_child(character, HUMANOID, "Folder");
        let offsets = scene.offsets().clone();
        let reader = MemoryReader::new(scene.into_memory());
        let remote = Remote::new(&reader, &offsets);

        let entity = SnapshotBuilder::new(remote).build_character(remote.instance(character));
        assert!(entity.humanoid.is_null());
        assert_eq!(entity.rig_kind, None);
        assert_eq!(entity.children.len(), 1);
    }

    #[test]
    fn test_distance_and_tool() {
        let mut scene = MockScene::new(OffsetTable::default());
        let character = scene.instance("dave", "Model");
        let root = scene.add_child(character, "HumanoidRootPart", "Part");
        let tool = scene.add_child(character, "Sword", "Tool");
        scene.add_child(character, "Hat", "Accessory");
        let primitive = scene.alloc(0x200);
        let layout = scene.offsets().base_part;
        scene.write(root + layout.primitive, primitive);
        scene.write(primitive + layout.position, Vector3::new(3.0, 4.0, 0.0));
        let offsets = scene.offsets().clone();
        let reader = MemoryReader::new(scene.into_memory());
        let remote = Remote::new(&reader, &offsets);

        let entity = SnapshotBuilder::new(remote)
            .viewpoint(Vector3::ZERO)
            .build_character(remote.instance(character));

        assert_eq!(entity.root_part(), InstanceId(root));
        assert_eq!(entity.r15.get(R15Part::HumanoidRootPart), InstanceId(root));
        assert_eq!(entity.root_position, Some(Vector3::new(3.0, 4.0, 0.0)));
        assert_eq!(entity.distance, Some(5.0));
        assert_eq!(
            entity.tool,
            Some(ToolInfo {
                id: InstanceId(tool),
                name: "Sword".to_string()
            })
        );
    }

    #[test]
    fn test_build_player() {
        let mut scene = MockScene::new(OffsetTable::default());
        let service = scene.instance("Players", "Players");
        let player = scene.add_child(service, "erin", "Player");
        let other = scene.add_child(service, "frank", "Player");
        let character = scene.instance("erin", "Model");
        let team = scene.instance("Blue", "Team");
        let layout = scene.offsets().player;
        scene.write(player + layout.model_instance, character);
        scene.write(player + layout.team, team);
        scene.write(service + scene.offsets().players.local_player, player);
        let offsets = scene.offsets().clone();
        let reader = MemoryReader::new(scene.into_memory());
        let remote = Remote::new(&reader, &offsets);

        let service = remote.instance(service).cast::<Players<_>>().unwrap();
        let entities = SnapshotBuilder::new(remote)
            .local_player(service.local_player().id())
            .build_all(&service);

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].player, InstanceId(player));
        assert_eq!(entities[0].character, InstanceId(character));
        assert_eq!(entities[0].team, InstanceId(team));
        assert!(entities[0].local_player);
        // Not spawned yet: still reported, with a null character
        assert_eq!(entities[1].player, InstanceId(other));
        assert_eq!(entities[1].name, "frank");
        assert!(!entities[1].has_character());
        assert!(!entities[1].local_player);
    }
}
