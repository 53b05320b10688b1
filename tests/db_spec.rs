use inlay::db::Database;
use inlay::error::StoreError;
use inlay::models::*;
use inlay::store::{single_change, ContainerStore, FieldChanges};
use serde_json::json;
use speculate2::speculate;
use tokio_test::block_on;
use uuid::Uuid;

fn create_test_container(db: &Database) -> Container {
    db.create_container(CreateContainerInput {
        name: "Test Card".to_string(),
        kind: ContainerKind::ActionCard,
        ownership: Ownership::owned_by("alice"),
        locked: false,
        system: Some(json!({
            "embeddedEffects": [{ "id": "e1", "kind": "status", "effects": [] }],
            "cost": 2
        })),
    })
    .expect("Failed to create container")
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
    }

    describe "containers" {
        describe "create_container" {
            it "creates a container with an empty system by default" {
                let container = db.create_container(CreateContainerInput {
                    name: "Bare".to_string(),
                    kind: ContainerKind::Item,
                    ownership: Ownership::default(),
                    locked: false,
                    system: None,
                }).expect("Failed to create container");

                assert_eq!(container.name, "Bare");
                assert_eq!(container.kind, ContainerKind::Item);
                assert_eq!(container.system, json!({}));
                assert_eq!(container.revision, 0);
            }

            it "rejects non-object system data" {
                let result = db.create_container(CreateContainerInput {
                    name: "Broken".to_string(),
                    kind: ContainerKind::Item,
                    ownership: Ownership::default(),
                    locked: false,
                    system: Some(json!([1, 2, 3])),
                });

                assert!(result.is_err());
            }
        }

        describe "get_container" {
            it "returns None for non-existent container" {
                let result = db.get_container(Uuid::new_v4()).expect("Query failed");
                assert!(result.is_none());
            }

            it "round-trips ownership and system data" {
                let created = create_test_container(&db);

                let found = db.get_container(created.id).expect("Query failed").unwrap();

                assert_eq!(found.ownership, Ownership::owned_by("alice"));
                assert_eq!(found.system, created.system);
                assert_eq!(found.kind, ContainerKind::ActionCard);
            }
        }

        describe "get_all_containers" {
            it "returns all containers ordered by name" {
                for name in ["Zebra", "Alpha"] {
                    db.create_container(CreateContainerInput {
                        name: name.to_string(),
                        kind: ContainerKind::Actor,
                        ownership: Ownership::default(),
                        locked: false,
                        system: None,
                    }).expect("Failed to create");
                }

                let containers = db.get_all_containers().expect("Query failed");
                let names: Vec<_> = containers.iter().map(|c| c.name.as_str()).collect();
                assert_eq!(names, vec!["Alpha", "Zebra"]);
            }
        }

        describe "update_container" {
            it "updates name and lock state" {
                let created = create_test_container(&db);

                let updated = db.update_container(created.id, UpdateContainerInput {
                    name: Some("Renamed".to_string()),
                    locked: Some(true),
                    ownership: None,
                }).expect("Update failed").unwrap();

                assert_eq!(updated.name, "Renamed");
                assert!(updated.locked);
                assert_eq!(updated.revision, 1);
                assert_eq!(updated.system, created.system);
            }

            it "returns None for non-existent container" {
                let result = db.update_container(Uuid::new_v4(), UpdateContainerInput {
                    name: Some("Ghost".to_string()),
                    ..Default::default()
                }).expect("Update failed");
                assert!(result.is_none());
            }
        }

        describe "update_container_fields" {
            it "replaces only the addressed field" {
                let created = create_test_container(&db);
                let changes = single_change("system.embeddedEffects", json!([]));

                let updated = db.update_container_fields(created.id, &changes)
                    .expect("Update failed")
                    .unwrap();

                assert_eq!(updated.system, json!({ "embeddedEffects": [], "cost": 2 }));
                assert_eq!(updated.revision, 1);
            }

            it "applies several fields in one revision" {
                let created = create_test_container(&db);
                let mut changes = FieldChanges::new();
                changes.insert("system.cost".to_string(), json!(3));
                changes.insert("system.actionCardGroups".to_string(), json!([]));

                let updated = db.update_container_fields(created.id, &changes)
                    .expect("Update failed")
                    .unwrap();

                assert_eq!(updated.system["cost"], json!(3));
                assert_eq!(updated.system["actionCardGroups"], json!([]));
                assert_eq!(updated.revision, 1);
            }

            it "rejects read-only fields" {
                let created = create_test_container(&db);
                let changes = single_change("kind", json!("actor"));

                assert!(db.update_container_fields(created.id, &changes).is_err());
                let unchanged = db.get_container(created.id).unwrap().unwrap();
                assert_eq!(unchanged.kind, ContainerKind::ActionCard);
            }

            it "rejects changes that leave the container undecodable" {
                let created = create_test_container(&db);
                let changes = single_change("name", json!(42));

                assert!(db.update_container_fields(created.id, &changes).is_err());
                let unchanged = db.get_container(created.id).unwrap().unwrap();
                assert_eq!(unchanged.name, "Test Card");
                assert_eq!(unchanged.revision, 0);
            }
        }

        describe "delete_container" {
            it "deletes an existing container" {
                let created = create_test_container(&db);
                assert!(db.delete_container(created.id).expect("Delete failed"));
                assert!(db.get_container(created.id).unwrap().is_none());
            }

            it "returns false for non-existent container" {
                assert!(!db.delete_container(Uuid::new_v4()).expect("Delete failed"));
            }
        }
    }

    describe "container store" {
        it "reads fields by dotted path" {
            let created = create_test_container(&db);

            let effects = block_on(db.get(created.id, "system.embeddedEffects")).unwrap();
            let first_id = block_on(db.get(created.id, "system.embeddedEffects.0.id")).unwrap();
            let missing = block_on(db.get(created.id, "system.embeddedItem")).unwrap();

            assert_eq!(effects.unwrap().as_array().map(Vec::len), Some(1));
            assert_eq!(first_id, Some(json!("e1")));
            assert!(missing.is_none());
        }

        it "writes fields through update" {
            let created = create_test_container(&db);

            block_on(db.update(created.id, single_change("system.embeddedItem", json!({ "id": "i1", "kind": "action" }))))
                .expect("Update failed");

            let loaded = block_on(db.load(created.id)).unwrap();
            assert_eq!(loaded.field(EmbeddedField::Item), Some(json!({ "id": "i1", "kind": "action" })));
            assert_eq!(loaded.revision, 1);
        }

        it "reports missing containers" {
            let id = Uuid::new_v4();

            let load = block_on(db.load(id)).unwrap_err();
            let update = block_on(db.update(id, single_change("system.cost", json!(1)))).unwrap_err();

            assert!(matches!(load, StoreError::ContainerNotFound(missing) if missing == id));
            assert!(matches!(update, StoreError::ContainerNotFound(_)));
        }

        it "refuses read-only fields" {
            let created = create_test_container(&db);

            let err = block_on(db.update(created.id, single_change("revision", json!(99)))).unwrap_err();

            assert!(matches!(err, StoreError::ReadOnlyField(path) if path == "revision"));
        }
    }
}
