//! Catalog snapshot inspector
//!
//! Prints statistics, item records and relations of a catalog snapshot, and
//! can resolve pictures and price guides from the disk cache.

use anyhow::{bail, Context, Result};
use catalog_engine::{
    Catalog, Condition, Core, EngineConfig, FsStorage, Item, OfflineTransfer, Price,
    SnapshotHeader, SnapshotReader, Time,
};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "catalog-tool")]
#[command(about = "Inspect catalog snapshots and the artifact disk cache")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the snapshot header
    Header { snapshot: PathBuf },

    /// Table sizes as JSON
    Stats { snapshot: PathBuf },

    /// Show one item
    Item {
        snapshot: PathBuf,
        item_type: char,
        id: String,
    },

    /// List what an item consists of
    Bom {
        snapshot: PathBuf,
        item_type: char,
        id: String,
    },

    /// List the items an item appears in
    AppearsIn {
        snapshot: PathBuf,
        item_type: char,
        id: String,

        /// Restrict to one color id
        #[arg(short, long)]
        color: Option<u32>,
    },

    /// Resolve a picture and price guide through the engine (disk cache only)
    Lookup {
        /// Engine configuration (TOML)
        #[arg(short = 'c', long)]
        config: PathBuf,

        item_type: char,
        id: String,

        #[arg(long)]
        color: Option<u32>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Header { snapshot } => {
            let mut buf = [0u8; catalog_engine::core::header::HEADER_SIZE];
            File::open(&snapshot)
                .and_then(|mut f| f.read_exact(&mut buf))
                .with_context(|| format!("reading {}", snapshot.display()))?;
            let header = SnapshotHeader::from_bytes(&buf)?;

            println!("version:     {}.{}", header.version_major, header.version_minor);
            println!("compressed:  {}", header.is_compressed());
            println!("item types:  {}", header.item_type_count);
            println!("categories:  {}", header.category_count);
            println!("colors:      {}", header.color_count);
            println!("items:       {}", header.item_count);
            println!("body:        {} bytes, crc32 {:#010x}", header.body_len, header.body_crc32);
            if let Some(created) = chrono::DateTime::from_timestamp(header.created_at, 0) {
                println!("created:     {}", created.to_rfc3339());
            }
            header.validate()?;
        }

        Command::Stats { snapshot } => {
            let catalog = load(&snapshot)?;
            println!("{}", serde_json::to_string_pretty(&catalog.stats())?);
        }

        Command::Item {
            snapshot,
            item_type,
            id,
        } => {
            let catalog = load(&snapshot)?;
            let item = find(&catalog, item_type, &id)?;

            println!("{} {} - {}", item.item_type_id(), item.id(), item.name());
            for cat in catalog.categories_of(item) {
                println!("  category:  {} ({})", cat.name(), cat.id());
            }
            if let Some(color) = catalog.default_color_of(item) {
                println!("  color:     {} ({})", color.name(), color.id());
            }
            if let Some(year) = item.year_released() {
                println!("  released:  {}", year);
            }
            if item.weight() > 0.0 {
                println!("  weight:    {:.2} g", item.weight());
            }
            println!("  parts:     {}", catalog.consists_of(item).len());
            println!("  used in:   {}", catalog.appears_in(item, None).len());
        }

        Command::Bom {
            snapshot,
            item_type,
            id,
        } => {
            let catalog = load(&snapshot)?;
            let item = find(&catalog, item_type, &id)?;

            for line in catalog.consists_of(item) {
                let mut flags = String::new();
                if line.extra {
                    flags.push_str(" extra");
                }
                if line.alternate {
                    flags.push_str(&format!(" alt#{}", line.alt_id));
                }
                if line.counterpart {
                    flags.push_str(" counterpart");
                }
                println!(
                    "{:>5} x {} {} [{}]{}",
                    line.quantity,
                    line.item.item_type_id(),
                    line.item.id(),
                    line.color.name(),
                    flags
                );
            }
        }

        Command::AppearsIn {
            snapshot,
            item_type,
            id,
            color,
        } => {
            let catalog = load(&snapshot)?;
            let item = find(&catalog, item_type, &id)?;
            let color = match color {
                Some(id) => match catalog.color(id) {
                    Some(c) => Some(c),
                    None => bail!("unknown color {}", id),
                },
                None => None,
            };

            for line in catalog.appears_in(item, color) {
                println!(
                    "{:>5} x in {} {} - {} [{}]",
                    line.quantity,
                    line.item.item_type_id(),
                    line.item.id(),
                    line.item.name(),
                    line.color.name()
                );
            }
        }

        Command::Lookup {
            config,
            item_type,
            id,
            color,
        } => {
            let mut config = EngineConfig::from_file(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            config.online = false;

            let storage = Arc::new(FsStorage::new(&config.data_dir));
            let mut core = Core::open(config, storage, Arc::new(OfflineTransfer))?;
            let catalog = Arc::clone(core.catalog());
            let item = find(&catalog, item_type, &id)?;
            let color = color.and_then(|id| catalog.color(id));

            let picture = core.picture(item, color, true);
            let price_guide = core.price_guide(item, color, true);
            if !core.run_until_idle(Duration::from_secs(10)) {
                bail!("timed out waiting for the disk cache");
            }

            if let Some(pic) = picture {
                info!("picture {:?}", pic);
                match pic.payload() {
                    Some(data) => println!(
                        "picture:      {:?} {} bytes {:?}",
                        data.format(),
                        data.bytes().len(),
                        data.dimensions()
                    ),
                    None => println!("picture:      {:?}", pic.status()),
                }
            }
            if let Some(pg) = price_guide {
                match pg.payload() {
                    Some(data) => {
                        for time in Time::ALL {
                            for condition in Condition::ALL {
                                println!(
                                    "price guide:  {:?}/{:?} qty {} lots {} avg {:.3}",
                                    time,
                                    condition,
                                    data.quantity(time, condition),
                                    data.lots(time, condition),
                                    data.price(time, condition, Price::Average)
                                );
                            }
                        }
                    }
                    None => println!("price guide:  {:?}", pg.status()),
                }
            }
        }
    }

    Ok(())
}

fn load(path: &PathBuf) -> Result<Catalog> {
    SnapshotReader::read(path).with_context(|| format!("loading snapshot {}", path.display()))
}

fn find<'a>(catalog: &'a Catalog, item_type: char, id: &str) -> Result<&'a Item> {
    match catalog.item(item_type, id) {
        Some(item) => Ok(item),
        None => bail!("no item {} {}", item_type, id),
    }
}
