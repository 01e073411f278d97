use clap::Parser;
use colored::*;
use directories::ProjectDirs;
use imagecat::access::Acl;
use imagecat::api::{
    Catalog, CmdMessage, InstanceUpdate, MessageLevel, NewRootImage, PlaneSpec, RootImageUpdate,
};
use imagecat::commands::CmdResult;
use imagecat::config::CatalogConfig;
use imagecat::error::{CatalogError, Result};
use imagecat::model::Caller;
use imagecat::query::{ListRequest, SearchParameter, SortDirection};
use imagecat::store::sqlite::SqliteStore;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

mod args;
use args::{Cli, Commands, IngestArgs, ListingArgs, ProjectCommands, StorageCommands};

const DB_FILENAME: &str = "catalog.db";

fn main() {
    init_tracing();
    if let Err(e) = run() {
        eprintln!("{} {}", "Error:".red(), e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("IMAGECAT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

struct AppContext {
    api: Catalog<SqliteStore, Acl, Caller>,
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db.clone())?;
    let config_dir = config_dir(&db_path);

    // Config never needs the database.
    if let Commands::Config { key, value } = &cli.command {
        return handle_config(&config_dir, key.clone(), value.clone());
    }

    let ctx = init_context(&cli, &db_path, &config_dir)?;
    match cli.command {
        Commands::Init => {
            print_messages(&[CmdMessage::success(format!(
                "Catalog ready at {}",
                db_path.display()
            ))]);
            Ok(())
        }
        Commands::Storage(cmd) => match cmd {
            StorageCommands::Create { name } => print_result(ctx.api.create_storage(&name)?),
            StorageCommands::AddMember {
                storage,
                user,
                write,
            } => print_messages_only(ctx.api.add_storage_member(storage, user, write)?),
        },
        Commands::Project(cmd) => match cmd {
            ProjectCommands::Create { name, blind } => {
                print_result(ctx.api.create_project(&name, blind)?)
            }
            ProjectCommands::AddMember {
                project,
                user,
                manager,
            } => print_messages_only(ctx.api.add_project_member(project, user, manager)?),
        },
        Commands::Ingest(args) => handle_ingest(&ctx, args),
        Commands::AddPlane {
            image,
            channel,
            z_stack,
            time,
            name,
            color,
        } => {
            let spec = PlaneSpec {
                channel_name: name,
                channel_color: color,
                ..PlaneSpec::at(channel, z_stack, time)
            };
            print_result(ctx.api.add_plane(image, spec)?)
        }
        Commands::Attach { project, image } => print_result(ctx.api.attach_image(project, image)?),
        Commands::List {
            project,
            light: true,
            ..
        } => match project {
            Some(project) => print_result(ctx.api.list_project_instances_light(project)?),
            None => print_result(ctx.api.list_user_instances_light()?),
        },
        Commands::List {
            project, listing, ..
        } => {
            let request = listing_request(&listing, ctx.api.config())?;
            match project {
                Some(project) => print_result(ctx.api.list_project_instances(project, &request)?),
                None => print_result(ctx.api.list_user_instances(&request)?),
            }
        }
        Commands::Bounds { project } => print_result(ctx.api.instance_bounds(project)?),
        Commands::Next { instance } => print_result(ctx.api.next_instance(instance)?),
        Commands::Previous { instance } => print_result(ctx.api.previous_instance(instance)?),
        Commands::Images { project, listing } => {
            let request = listing_request(&listing, ctx.api.config())?;
            print_result(ctx.api.list_root_images(&request, project)?)
        }
        Commands::Reference {
            image,
            instance,
            axes,
        } => match (image, instance) {
            (_, Some(instance)) => print_result(ctx.api.get_reference_slice(instance)?),
            (Some(image), None) if axes => print_result(ctx.api.axis_coordinates(image)?),
            (Some(image), None) => print_result(ctx.api.get_reference_plane(image)?),
            (None, None) => Err(CatalogError::InvalidArgument(
                "give a root image id or --instance".to_string(),
            )),
        },
        Commands::UpdateImage {
            image,
            magnification,
            physical_size_x,
            physical_size_y,
            physical_size_z,
            fps,
        } => {
            let update = RootImageUpdate {
                magnification: nullable("magnification", magnification)?,
                physical_size_x: nullable("physical-size-x", physical_size_x)?,
                physical_size_y: nullable("physical-size-y", physical_size_y)?,
                physical_size_z: nullable("physical-size-z", physical_size_z)?,
                fps: nullable("fps", fps)?,
                colorspace: None,
            };
            print_result(ctx.api.update_root_image(image, update)?)
        }
        Commands::UpdateInstance {
            instance,
            name,
            magnification,
            physical_size_x,
        } => {
            let update = InstanceUpdate {
                instance_filename: nullable("name", name)?,
                magnification: nullable("magnification", magnification)?,
                physical_size_x: nullable("physical-size-x", physical_size_x)?,
                ..Default::default()
            };
            print_result(ctx.api.update_instance(instance, update)?)
        }
        Commands::Review {
            instance,
            stop,
            cancel,
        } => {
            if stop || cancel {
                print_result(ctx.api.stop_review(instance, cancel)?)
            } else {
                print_result(ctx.api.start_review(instance)?)
            }
        }
        Commands::DeleteImage { image } => print_result(ctx.api.delete_root_image(image)?),
        Commands::DeletePlane { plane } => print_result(ctx.api.delete_plane(plane)?),
        Commands::DeleteInstance { instance, purge } => {
            if purge {
                print_result(ctx.api.purge_instance(instance)?)
            } else {
                print_result(ctx.api.delete_instance(instance)?)
            }
        }
        Commands::Config { .. } => Ok(()),
    }
}

fn resolve_db_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let dirs = ProjectDirs::from("org", "imagecat", "imagecat").ok_or_else(|| {
        CatalogError::InvalidArgument("could not determine a data directory; pass --db".to_string())
    })?;
    Ok(dirs.data_dir().join(DB_FILENAME))
}

/// `config.json` lives next to the database.
fn config_dir(db_path: &Path) -> PathBuf {
    match db_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn init_context(cli: &Cli, db_path: &Path, config_dir: &Path) -> Result<AppContext> {
    let config = CatalogConfig::load(config_dir)?;
    let store = SqliteStore::open(db_path, &config)?;
    let acl = Acl::load(&store)?;
    let caller = if cli.admin {
        Caller::admin(cli.user)
    } else {
        Caller::user(cli.user)
    };
    Ok(AppContext {
        api: Catalog::new(store, acl, caller, config),
    })
}

fn handle_ingest(ctx: &AppContext, args: IngestArgs) -> Result<()> {
    let new = NewRootImage {
        channels: args.channels,
        depth: args.depth,
        duration: args.duration,
        width: args.width,
        height: args.height,
        magnification: args.magnification,
        physical_size_x: args.physical_size_x,
        content_type: args.content_type,
        size: args.size,
        ..NewRootImage::new(args.storage, args.filename)
    };
    print_result(ctx.api.ingest_image(new)?)
}

fn handle_config(config_dir: &Path, key: Option<String>, value: Option<String>) -> Result<()> {
    let mut config = CatalogConfig::load(config_dir)?;
    match (key, value) {
        (Some(key), Some(value)) => {
            config.set(&key, &value)?;
            config.save(config_dir)?;
            print_messages(&[CmdMessage::success(format!("{} = {}", key, value))]);
        }
        (Some(key), None) => println!("{} = {}", key, config.get(&key)?),
        (None, _) => {
            for key in [
                "calibration-mode",
                "reference-fallback",
                "stable-sort",
                "default-page-size",
                "busy-timeout-ms",
            ] {
                println!("{} = {}", key, config.get(key)?);
            }
        }
    }
    Ok(())
}

fn listing_request(args: &ListingArgs, config: &CatalogConfig) -> Result<ListRequest> {
    let mut request = ListRequest::new();
    for filter in &args.filters {
        request.filters.push(SearchParameter::from_str(filter)?);
    }
    request.sort = args.sort.clone();
    request.direction = SortDirection::parse_lenient(&args.order);
    request.offset = args.offset;
    request.max = args.max.unwrap_or(config.default_page_size);
    Ok(request)
}

/// `None` when the flag is absent, `Some(None)` for "null".
fn nullable<T: FromStr>(flag: &str, value: Option<String>) -> Result<Option<Option<T>>> {
    match value.as_deref() {
        None => Ok(None),
        Some("null") => Ok(Some(None)),
        Some(raw) => raw.parse().map(|v| Some(Some(v))).map_err(|_| {
            CatalogError::InvalidArgument(format!("invalid value '{}' for --{}", raw, flag))
        }),
    }
}

/// Data goes to stdout as JSON, messages to stderr.
fn print_result<T: Serialize>(result: CmdResult<T>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&result.data)?);
    print_messages(&result.messages);
    Ok(())
}

fn print_messages_only<T>(result: CmdResult<T>) -> Result<()> {
    print_messages(&result.messages);
    Ok(())
}

fn print_messages(messages: &[CmdMessage]) {
    for message in messages {
        match message.level {
            MessageLevel::Info => eprintln!("{}", message.content.dimmed()),
            MessageLevel::Success => eprintln!("{}", message.content.green()),
            MessageLevel::Warning => eprintln!("{}", message.content.yellow()),
        }
    }
}
