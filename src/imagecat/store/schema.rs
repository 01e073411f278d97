//! Catalog schema bootstrap.
//!
//! Tables are created with `IF NOT EXISTS` so opening an existing catalog is
//! a no-op. Foreign keys are declared without cascades: dependents are removed
//! explicitly by the deletion commands, in dependency order.

use rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS storage (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    user_id         INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS storage_member (
    storage_id      INTEGER NOT NULL REFERENCES storage(id),
    user_id         INTEGER NOT NULL,
    can_write       INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (storage_id, user_id)
);

CREATE TABLE IF NOT EXISTS project (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    blind_mode      INTEGER NOT NULL DEFAULT 0,
    read_only       INTEGER NOT NULL DEFAULT 0,
    created         INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS project_member (
    project_id      INTEGER NOT NULL REFERENCES project(id),
    user_id         INTEGER NOT NULL,
    manager         INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (project_id, user_id)
);

CREATE TABLE IF NOT EXISTS stored_file (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id             INTEGER NOT NULL,
    storage_id          INTEGER NOT NULL REFERENCES storage(id),
    parent_id           INTEGER REFERENCES stored_file(id),
    filename            TEXT NOT NULL,
    original_filename   TEXT NOT NULL,
    ext                 TEXT,
    content_type        TEXT,
    size                INTEGER NOT NULL DEFAULT 0,
    status              INTEGER NOT NULL DEFAULT 0,
    created             INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS root_image (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    stored_file_id      INTEGER REFERENCES stored_file(id),
    original_filename   TEXT NOT NULL,
    width               INTEGER,
    height              INTEGER,
    depth               INTEGER NOT NULL DEFAULT 1,
    duration            INTEGER NOT NULL DEFAULT 1,
    channels            INTEGER NOT NULL DEFAULT 1,
    physical_size_x     REAL,
    physical_size_y     REAL,
    physical_size_z     REAL,
    fps                 REAL,
    bit_depth           INTEGER,
    colorspace          TEXT,
    magnification       INTEGER,
    user_id             INTEGER,
    created             INTEGER NOT NULL,
    updated             INTEGER
);

CREATE TABLE IF NOT EXISTS plane (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    root_image_id       INTEGER NOT NULL REFERENCES root_image(id),
    channel             INTEGER NOT NULL,
    z_stack             INTEGER NOT NULL,
    time                INTEGER NOT NULL,
    channel_name        TEXT,
    channel_color       TEXT,
    UNIQUE (root_image_id, channel, z_stack, time)
);

CREATE TABLE IF NOT EXISTS project_instance (
    id                          INTEGER PRIMARY KEY AUTOINCREMENT,
    base_image_id               INTEGER NOT NULL REFERENCES root_image(id),
    project_id                  INTEGER NOT NULL REFERENCES project(id),
    user_id                     INTEGER NOT NULL,
    instance_filename           TEXT,
    magnification               INTEGER,
    magnification_source        TEXT NOT NULL DEFAULT 'inherited',
    physical_size_x             REAL,
    physical_size_x_source      TEXT NOT NULL DEFAULT 'inherited',
    physical_size_y             REAL,
    physical_size_z             REAL,
    fps                         REAL,
    count_annotations           INTEGER NOT NULL DEFAULT 0,
    count_job_annotations       INTEGER NOT NULL DEFAULT 0,
    count_reviewed_annotations  INTEGER NOT NULL DEFAULT 0,
    review_start                INTEGER,
    review_stop                 INTEGER,
    review_user_id              INTEGER,
    state                       TEXT NOT NULL DEFAULT 'active',
    created                     INTEGER NOT NULL,
    updated                     INTEGER,
    deleted                     INTEGER
);

CREATE INDEX IF NOT EXISTS idx_project_instance_binding
    ON project_instance(project_id, base_image_id);

CREATE INDEX IF NOT EXISTS idx_project_instance_base_image
    ON project_instance(base_image_id);

CREATE TABLE IF NOT EXISTS plane_instance (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    plane_id            INTEGER NOT NULL REFERENCES plane(id),
    instance_id         INTEGER NOT NULL REFERENCES project_instance(id),
    project_id          INTEGER NOT NULL REFERENCES project(id),
    UNIQUE (plane_id, instance_id)
);

CREATE TABLE IF NOT EXISTS companion_file (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    root_image_id       INTEGER NOT NULL REFERENCES root_image(id),
    stored_file_id      INTEGER REFERENCES stored_file(id),
    filename            TEXT NOT NULL,
    original_filename   TEXT NOT NULL,
    kind                TEXT,
    UNIQUE (root_image_id, stored_file_id)
);

CREATE TABLE IF NOT EXISTS attached_file (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    domain_kind         TEXT NOT NULL,
    domain_id           INTEGER NOT NULL,
    filename            TEXT NOT NULL,
    created             INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_attached_file_domain
    ON attached_file(domain_kind, domain_id);

CREATE TABLE IF NOT EXISTS nested_instance (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id           INTEGER NOT NULL REFERENCES project_instance(id),
    base_image_id       INTEGER NOT NULL REFERENCES root_image(id),
    project_id          INTEGER NOT NULL REFERENCES project(id),
    x                   INTEGER NOT NULL DEFAULT 0,
    y                   INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS tag (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    name                TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS tag_link (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    tag_id              INTEGER NOT NULL REFERENCES tag(id),
    instance_id         INTEGER NOT NULL REFERENCES project_instance(id),
    UNIQUE (tag_id, instance_id)
);
";

/// Create every catalog table and index that does not exist yet.
pub fn bootstrap(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}
