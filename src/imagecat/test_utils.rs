//! Catalog fixtures for tests.
//!
//! Seeds rows straight into a store, bypassing the commands, so each test
//! can build exactly the state it needs.

use crate::model::{now_millis, AttachmentDomain, Id};
use crate::store::sqlite::SqliteStore;
use crate::store::{bind, Executor, Params, SqlValue};

pub fn test_store() -> SqliteStore {
    SqliteStore::open_in_memory().unwrap()
}

pub fn seed_storage<E: Executor>(exec: &E, owner: Id) -> Id {
    exec.insert(
        "INSERT INTO storage (name, user_id) VALUES (:name, :owner) RETURNING id",
        &bind([("name", format!("storage of {}", owner).into()), ("owner", owner.into())]),
    )
    .unwrap()
}

pub fn seed_storage_member<E: Executor>(exec: &E, storage: Id, user: Id, can_write: bool) {
    exec.execute(
        "INSERT INTO storage_member (storage_id, user_id, can_write) VALUES (:storage, :user, :write)",
        &bind([
            ("storage", storage.into()),
            ("user", user.into()),
            ("write", can_write.into()),
        ]),
    )
    .unwrap();
}

pub fn seed_project<E: Executor>(exec: &E, name: &str, blind: bool) -> Id {
    exec.insert(
        "INSERT INTO project (name, blind_mode, created) VALUES (:name, :blind, :now) RETURNING id",
        &bind([
            ("name", name.into()),
            ("blind", blind.into()),
            ("now", now_millis().into()),
        ]),
    )
    .unwrap()
}

pub fn seed_member<E: Executor>(exec: &E, project: Id, user: Id, manager: bool) {
    exec.execute(
        "INSERT INTO project_member (project_id, user_id, manager) VALUES (:project, :user, :manager)",
        &bind([
            ("project", project.into()),
            ("user", user.into()),
            ("manager", manager.into()),
        ]),
    )
    .unwrap();
}

/// A root image, with a stored file in `storage` when one is given. The
/// storage owner is recorded as uploader.
pub fn seed_root_image<E: Executor>(exec: &E, storage: Option<Id>, filename: &str) -> Id {
    let now = now_millis();
    let (stored_file, owner) = match storage {
        Some(storage) => {
            let owner = exec
                .query_opt(
                    "SELECT user_id FROM storage WHERE id = :id",
                    &bind([("id", storage.into())]),
                )
                .unwrap()
                .unwrap()
                .i64("user_id")
                .unwrap();
            let file = exec
                .insert(
                    "INSERT INTO stored_file (user_id, storage_id, filename, original_filename, content_type, created) \
                     VALUES (:user, :storage, :filename, :filename, 'image/tiff', :now) RETURNING id",
                    &bind([
                        ("user", owner.into()),
                        ("storage", storage.into()),
                        ("filename", filename.into()),
                        ("now", now.into()),
                    ]),
                )
                .unwrap();
            (Some(file), Some(owner))
        }
        None => (None, None),
    };
    exec.insert(
        "INSERT INTO root_image (stored_file_id, original_filename, width, height, user_id, created) \
         VALUES (:file, :filename, 1000, 800, :user, :now) RETURNING id",
        &bind([
            ("file", stored_file.into()),
            ("filename", filename.into()),
            ("user", owner.into()),
            ("now", now.into()),
        ]),
    )
    .unwrap()
}

pub fn seed_root_calibration<E: Executor>(
    exec: &E,
    image: Id,
    magnification: Option<i32>,
    physical_size_x: Option<f64>,
) {
    exec.execute(
        "UPDATE root_image SET magnification = :mag, physical_size_x = :psx WHERE id = :id",
        &bind([
            ("mag", magnification.into()),
            ("psx", physical_size_x.into()),
            ("id", image.into()),
        ]),
    )
    .unwrap();
}

pub fn seed_plane<E: Executor>(exec: &E, image: Id, channel: i32, z_stack: i32, time: i32) -> Id {
    exec.insert(
        "INSERT INTO plane (root_image_id, channel, z_stack, time) VALUES (:image, :c, :z, :t) RETURNING id",
        &bind([
            ("image", image.into()),
            ("c", channel.into()),
            ("z", z_stack.into()),
            ("t", time.into()),
        ]),
    )
    .unwrap()
}

/// An active instance with the root's calibration and one plane instance per
/// plane.
pub fn seed_instance<E: Executor>(exec: &E, project: Id, image: Id, user: Id) -> Id {
    let instance = exec
        .insert(
            "INSERT INTO project_instance (base_image_id, project_id, user_id, magnification, physical_size_x, created) \
             SELECT id, :project, :user, magnification, physical_size_x, :now FROM root_image WHERE id = :image \
             RETURNING id",
            &bind([
                ("project", project.into()),
                ("user", user.into()),
                ("now", now_millis().into()),
                ("image", image.into()),
            ]),
        )
        .unwrap();
    exec.execute(
        "INSERT INTO plane_instance (plane_id, instance_id, project_id) \
         SELECT id, :instance, :project FROM plane WHERE root_image_id = :image",
        &bind([
            ("instance", instance.into()),
            ("project", project.into()),
            ("image", image.into()),
        ]),
    )
    .unwrap();
    instance
}

pub fn seed_instance_calibration<E: Executor>(
    exec: &E,
    instance: Id,
    magnification: Option<i32>,
    physical_size_x: Option<f64>,
) {
    exec.execute(
        "UPDATE project_instance SET magnification = :mag, physical_size_x = :psx WHERE id = :id",
        &bind([
            ("mag", magnification.into()),
            ("psx", physical_size_x.into()),
            ("id", instance.into()),
        ]),
    )
    .unwrap();
}

pub fn seed_instance_name<E: Executor>(exec: &E, instance: Id, name: &str) {
    exec.execute(
        "UPDATE project_instance SET instance_filename = :name WHERE id = :id",
        &bind([("name", name.into()), ("id", instance.into())]),
    )
    .unwrap();
}

pub fn seed_counters<E: Executor>(exec: &E, instance: Id, annotations: i64) {
    exec.execute(
        "UPDATE project_instance SET count_annotations = :n WHERE id = :id",
        &bind([("n", annotations.into()), ("id", instance.into())]),
    )
    .unwrap();
}

pub fn mark_deleted<E: Executor>(exec: &E, instance: Id) {
    exec.execute(
        "UPDATE project_instance SET state = 'deleted', deleted = :now WHERE id = :id",
        &bind([("now", now_millis().into()), ("id", instance.into())]),
    )
    .unwrap();
}

pub fn seed_companion<E: Executor>(exec: &E, image: Id, filename: &str) -> Id {
    exec.insert(
        "INSERT INTO companion_file (root_image_id, filename, original_filename, kind) \
         VALUES (:image, :filename, :filename, 'HDF5') RETURNING id",
        &bind([("image", image.into()), ("filename", filename.into())]),
    )
    .unwrap()
}

pub fn seed_attached<E: Executor>(exec: &E, domain: AttachmentDomain, id: Id, filename: &str) -> Id {
    exec.insert(
        "INSERT INTO attached_file (domain_kind, domain_id, filename, created) \
         VALUES (:kind, :id, :filename, :now) RETURNING id",
        &bind([
            ("kind", domain.as_str().into()),
            ("id", id.into()),
            ("filename", filename.into()),
            ("now", now_millis().into()),
        ]),
    )
    .unwrap()
}

pub fn seed_nested<E: Executor>(exec: &E, parent: Id, image: Id, project: Id) -> Id {
    exec.insert(
        "INSERT INTO nested_instance (parent_id, base_image_id, project_id) \
         VALUES (:parent, :image, :project) RETURNING id",
        &bind([
            ("parent", parent.into()),
            ("image", image.into()),
            ("project", project.into()),
        ]),
    )
    .unwrap()
}

/// Tag an instance, creating the tag on first use. Returns the tag id.
pub fn seed_tag<E: Executor>(exec: &E, name: &str, instance: Id) -> Id {
    exec.execute(
        "INSERT OR IGNORE INTO tag (name) VALUES (:name)",
        &bind([("name", name.into())]),
    )
    .unwrap();
    let tag = exec
        .query_opt("SELECT id FROM tag WHERE name = :name", &bind([("name", name.into())]))
        .unwrap()
        .unwrap()
        .i64("id")
        .unwrap();
    exec.execute(
        "INSERT INTO tag_link (tag_id, instance_id) VALUES (:tag, :instance)",
        &bind([("tag", tag.into()), ("instance", instance.into())]),
    )
    .unwrap();
    tag
}

/// Row count of a table.
pub fn count<E: Executor>(exec: &E, table: &str) -> i64 {
    exec.query_opt(&format!("SELECT COUNT(*) AS n FROM {}", table), &Params::new())
        .unwrap()
        .unwrap()
        .i64("n")
        .unwrap()
}

/// A single column of one row.
pub fn cell<E: Executor>(exec: &E, table: &str, column: &str, id: Id) -> SqlValue {
    exec.query_opt(
        &format!("SELECT {} AS v FROM {} WHERE id = :id", column, table),
        &bind([("id", id.into())]),
    )
    .unwrap()
    .unwrap()
    .get("v")
    .cloned()
    .unwrap()
}
