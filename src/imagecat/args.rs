use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "imagecat", version)]
#[command(about = "Catalog of hierarchical annotation images", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Catalog database (defaults to the platform data directory)
    #[arg(long, env = "IMAGECAT_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Act as this user id
    #[arg(long, env = "IMAGECAT_USER", default_value_t = 1, global = true)]
    pub user: i64,

    /// Act as an administrator
    #[arg(long, global = true)]
    pub admin: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the catalog database
    Init,

    /// Manage storages
    #[command(subcommand)]
    Storage(StorageCommands),

    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommands),

    /// Register an uploaded image and its planes
    Ingest(IngestArgs),

    /// Add a plane to a root image
    AddPlane {
        image: i64,
        channel: i32,
        z_stack: i32,
        time: i32,

        /// Channel name
        #[arg(long)]
        name: Option<String>,

        /// Channel color
        #[arg(long)]
        color: Option<String>,
    },

    /// Bind a root image into a project (restores a deleted binding)
    Attach { project: i64, image: i64 },

    /// List project instances
    #[command(alias = "ls")]
    List {
        /// Only this project (default: every readable project)
        #[arg(short, long)]
        project: Option<i64>,

        /// Every instance, with only ids and names (ignores filters and paging)
        #[arg(long)]
        light: bool,

        #[command(flatten)]
        listing: ListingArgs,
    },

    /// Show the value ranges of a project's instances
    Bounds { project: i64 },

    /// Show the next older instance of the same project
    Next { instance: i64 },

    /// Show the next newer instance of the same project
    Previous { instance: i64 },

    /// List root images
    Images {
        /// Mark which images are bound in this project
        #[arg(short, long)]
        project: Option<i64>,

        #[command(flatten)]
        listing: ListingArgs,
    },

    /// Show the reference plane of a root image, or the reference slice of an instance
    Reference {
        /// Root image id
        #[arg(required_unless_present = "instance")]
        image: Option<i64>,

        /// Instance id
        #[arg(long, conflicts_with = "image")]
        instance: Option<i64>,

        /// Print the plane axes instead
        #[arg(long, conflicts_with = "instance")]
        axes: bool,
    },

    /// Update calibration of a root image ("null" clears a value)
    UpdateImage {
        image: i64,

        #[arg(long)]
        magnification: Option<String>,

        #[arg(long)]
        physical_size_x: Option<String>,

        #[arg(long)]
        physical_size_y: Option<String>,

        #[arg(long)]
        physical_size_z: Option<String>,

        #[arg(long)]
        fps: Option<String>,
    },

    /// Update an instance ("null" clears a value)
    UpdateInstance {
        instance: i64,

        /// Display name override
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        magnification: Option<String>,

        #[arg(long)]
        physical_size_x: Option<String>,
    },

    /// Start, validate or cancel the review of an instance
    Review {
        instance: i64,

        /// Validate the running review
        #[arg(long, conflicts_with = "cancel")]
        stop: bool,

        /// Cancel the running review
        #[arg(long)]
        cancel: bool,
    },

    /// Delete a root image that no project uses
    DeleteImage { image: i64 },

    /// Delete a plane that no live instance uses
    DeletePlane { plane: i64 },

    /// Delete an instance (restorable by attaching again)
    DeleteInstance {
        instance: i64,

        /// Remove an already deleted instance for good
        #[arg(long)]
        purge: bool,
    },

    /// Get or set configuration
    Config {
        /// Configuration key (e.g., calibration-mode)
        key: Option<String>,

        /// Value to set (if omitted, prints current value)
        value: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum StorageCommands {
    /// Create a storage owned by the current user
    Create { name: String },

    /// Grant a user access to a storage
    AddMember {
        storage: i64,
        user: i64,

        /// Allow writing
        #[arg(long)]
        write: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Create a project managed by the current user
    Create {
        name: String,

        /// Hide image names from non-managers
        #[arg(long)]
        blind: bool,
    },

    /// Add a user to a project
    AddMember {
        project: i64,
        user: i64,

        /// Make the user a manager
        #[arg(long)]
        manager: bool,
    },
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    pub storage: i64,
    pub filename: String,

    #[arg(long, default_value_t = 1)]
    pub channels: i32,

    #[arg(long, default_value_t = 1)]
    pub depth: i32,

    #[arg(long, default_value_t = 1)]
    pub duration: i32,

    #[arg(long)]
    pub width: Option<i32>,

    #[arg(long)]
    pub height: Option<i32>,

    #[arg(long)]
    pub magnification: Option<i32>,

    #[arg(long)]
    pub physical_size_x: Option<f64>,

    #[arg(long)]
    pub content_type: Option<String>,

    /// File size in bytes
    #[arg(long, default_value_t = 0)]
    pub size: i64,
}

#[derive(Args, Debug)]
pub struct ListingArgs {
    /// Filter as property[operator]=value, e.g. name[ilike]=kidney (repeatable)
    #[arg(short, long = "filter")]
    pub filters: Vec<String>,

    /// Sort column
    #[arg(short, long)]
    pub sort: Option<String>,

    /// Sort direction (asc or desc)
    #[arg(long, default_value = "asc")]
    pub order: String,

    #[arg(long, default_value_t = 0)]
    pub offset: u64,

    /// Page size (0 = everything; defaults to the configured page size)
    #[arg(long)]
    pub max: Option<u64>,
}
