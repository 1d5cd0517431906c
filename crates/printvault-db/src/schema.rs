/// SQL statements for creating the PrintVault database schema.

pub const CREATE_LIBRARY_FILES: &str = "
CREATE TABLE IF NOT EXISTS library_files (
    id                      TEXT PRIMARY KEY,
    checksum                TEXT NOT NULL,
    filename                TEXT NOT NULL,
    display_name            TEXT,
    library_path            TEXT NOT NULL,
    file_size               INTEGER NOT NULL DEFAULT 0,
    file_type               TEXT NOT NULL,
    status                  TEXT NOT NULL DEFAULT 'available',
    download_status         TEXT,
    is_duplicate            INTEGER NOT NULL DEFAULT 0,
    duplicate_of_checksum   TEXT,
    duplicate_count         INTEGER NOT NULL DEFAULT 0,
    width_mm                REAL,
    depth_mm                REAL,
    height_mm               REAL,
    layer_height_mm         REAL,
    nozzle_temp_c           REAL,
    bed_temp_c              REAL,
    filament_grams          REAL,
    filament_meters         REAL,
    print_time_seconds      INTEGER,
    estimated_cost          REAL,
    complexity_score        REAL,
    thumbnail_path          TEXT,
    last_analyzed           TEXT,
    error_message           TEXT,
    created_at              TEXT NOT NULL,
    updated_at              TEXT NOT NULL
)";

/// Exactly one canonical row per checksum; duplicate rows share the checksum.
pub const CREATE_CANONICAL_INDEX: &str = "
CREATE UNIQUE INDEX IF NOT EXISTS idx_library_files_canonical
ON library_files(checksum) WHERE is_duplicate = 0";

pub const CREATE_FILE_SOURCES: &str = "
CREATE TABLE IF NOT EXISTS file_sources (
    checksum        TEXT NOT NULL,
    source_type     TEXT NOT NULL,
    source_id       TEXT NOT NULL,
    original_path   TEXT NOT NULL,
    discovered_at   TEXT NOT NULL,
    metadata        TEXT,
    PRIMARY KEY (checksum, source_type, source_id, original_path)
)";

pub const CREATE_TAGS: &str = "
CREATE TABLE IF NOT EXISTS tags (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    usage_count INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
)";

pub const CREATE_FILE_TAGS: &str = "
CREATE TABLE IF NOT EXISTS file_tags (
    checksum    TEXT NOT NULL,
    tag_id      TEXT NOT NULL,
    assigned_at TEXT NOT NULL,
    PRIMARY KEY (checksum, tag_id),
    FOREIGN KEY (tag_id) REFERENCES tags(id)
)";

pub const CREATE_COLLECTIONS: &str = "
CREATE TABLE IF NOT EXISTS collections (
    id                  TEXT PRIMARY KEY,
    name                TEXT NOT NULL UNIQUE,
    description         TEXT,
    thumbnail_checksum  TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
)";

pub const CREATE_COLLECTION_MEMBERS: &str = "
CREATE TABLE IF NOT EXISTS collection_members (
    collection_id   TEXT NOT NULL,
    checksum        TEXT NOT NULL,
    sort_order      INTEGER NOT NULL DEFAULT 0,
    added_at        TEXT NOT NULL,
    PRIMARY KEY (collection_id, checksum),
    FOREIGN KEY (collection_id) REFERENCES collections(id)
)";

pub const CREATE_SLICERS: &str = "
CREATE TABLE IF NOT EXISTS slicers (
    id              TEXT PRIMARY KEY,
    slicer_type     TEXT NOT NULL,
    executable      TEXT NOT NULL,
    version         TEXT,
    is_available    INTEGER NOT NULL DEFAULT 0,
    last_checked    TEXT NOT NULL,
    UNIQUE(slicer_type, executable)
)";

pub const CREATE_SLICER_PROFILES: &str = "
CREATE TABLE IF NOT EXISTS slicer_profiles (
    id              TEXT PRIMARY KEY,
    slicer_id       TEXT NOT NULL,
    name            TEXT NOT NULL,
    profile_type    TEXT NOT NULL,
    settings        TEXT NOT NULL DEFAULT '{}',
    is_default      INTEGER NOT NULL DEFAULT 0,
    imported_at     TEXT NOT NULL,
    UNIQUE(slicer_id, name, profile_type),
    FOREIGN KEY (slicer_id) REFERENCES slicers(id)
)";

pub const CREATE_SLICING_JOBS: &str = "
CREATE TABLE IF NOT EXISTS slicing_jobs (
    id                              TEXT PRIMARY KEY,
    checksum                        TEXT NOT NULL,
    slicer_id                       TEXT NOT NULL,
    profile_id                      TEXT NOT NULL,
    printer_id                      TEXT,
    status                          TEXT NOT NULL DEFAULT 'queued',
    priority                        INTEGER NOT NULL DEFAULT 0,
    progress                        INTEGER NOT NULL DEFAULT 0,
    retry_count                     INTEGER NOT NULL DEFAULT 0,
    auto_upload                     INTEGER NOT NULL DEFAULT 0,
    auto_start                      INTEGER NOT NULL DEFAULT 0,
    output_file_path                TEXT,
    output_gcode_checksum           TEXT,
    error_message                   TEXT,
    estimated_print_time_seconds    INTEGER,
    estimated_filament_grams        REAL,
    created_at                      TEXT NOT NULL,
    started_at                      TEXT,
    completed_at                    TEXT,
    FOREIGN KEY (slicer_id) REFERENCES slicers(id),
    FOREIGN KEY (profile_id) REFERENCES slicer_profiles(id)
)";

pub const CREATE_QUEUE_INDEX: &str = "
CREATE INDEX IF NOT EXISTS idx_slicing_jobs_queue
ON slicing_jobs(status, priority DESC, created_at ASC)";

pub const CREATE_EVENTS: &str = "
CREATE TABLE IF NOT EXISTS events (
    id          TEXT PRIMARY KEY,
    event_type  TEXT NOT NULL,
    payload     TEXT NOT NULL DEFAULT '{}',
    created_at  TEXT NOT NULL
)";

pub const CREATE_SCAN_CACHE: &str = "
CREATE TABLE IF NOT EXISTS scan_cache (
    folder      TEXT NOT NULL,
    rel_path    TEXT NOT NULL,
    size        INTEGER NOT NULL,
    mtime       TEXT NOT NULL,
    xxh3_hash   TEXT NOT NULL,
    sha256_hash TEXT NOT NULL,
    cached_at   TEXT NOT NULL,
    PRIMARY KEY (folder, rel_path)
)";

pub const CREATE_SCHEMA_VERSION: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TEXT NOT NULL
)";

/// All table creation statements in order.
pub const ALL_TABLES: &[&str] = &[
    CREATE_SCHEMA_VERSION,
    CREATE_LIBRARY_FILES,
    CREATE_CANONICAL_INDEX,
    CREATE_FILE_SOURCES,
    CREATE_TAGS,
    CREATE_FILE_TAGS,
    CREATE_COLLECTIONS,
    CREATE_COLLECTION_MEMBERS,
    CREATE_SLICERS,
    CREATE_SLICER_PROFILES,
    CREATE_SLICING_JOBS,
    CREATE_QUEUE_INDEX,
    CREATE_EVENTS,
    CREATE_SCAN_CACHE,
];
