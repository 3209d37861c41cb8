/*++

Licensed under the Apache-2.0 license.

File Name:

   main.rs

Abstract:

    Main entry point of the flashy image validation application

--*/
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use flashy_image_types::{ImageFormat, VbootEnforcement};
use flashy_image_verify::{builtin_image_formats, validate, PartitionRegistry};
use log::LevelFilter;
use simple_logger::SimpleLogger;

mod config;

use config::{FormatsConfig, VbootSource};

#[derive(Parser)]
#[command(version, about = "Flashy firmware image validation tools", long_about = None)]
struct Cli {
    /// Log debug details
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a firmware image before it is flashed
    Validate {
        /// Image file or flash device
        image: PathBuf,

        #[command(flatten)]
        formats: FormatArgs,

        #[command(flatten)]
        vboot: VbootArgs,
    },
    /// Print the image format table
    ListFormats {
        #[command(flatten)]
        formats: FormatArgs,
    },
    /// Print the vboot enforcement of the target system
    VbootStatus {
        #[command(flatten)]
        vboot: VbootArgs,
    },
}

#[derive(Args)]
struct FormatArgs {
    /// Image format table (TOML, or JSON with a .json extension) replacing the built-in one
    #[arg(long, value_name = "FILE")]
    formats: Option<PathBuf>,

    /// Only try the image format with this name
    #[arg(long, value_name = "NAME")]
    format: Option<String>,
}

impl FormatArgs {
    fn load(&self) -> anyhow::Result<Vec<ImageFormat>> {
        let formats = match &self.formats {
            Some(path) => config::load_formats(path)?,
            None => builtin_image_formats(),
        };
        match &self.format {
            Some(name) => config::select_format(formats, name),
            None => Ok(formats),
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum VbootArg {
    None,
    Software,
    Hardware,
}

impl From<VbootArg> for VbootEnforcement {
    fn from(arg: VbootArg) -> Self {
        match arg {
            VbootArg::None => VbootEnforcement::None,
            VbootArg::Software => VbootEnforcement::SoftwareEnforce,
            VbootArg::Hardware => VbootEnforcement::HardwareEnforce,
        }
    }
}

#[derive(Args)]
struct VbootArgs {
    /// Vboot enforcement of the target system
    #[arg(long, value_enum, conflicts_with = "proc_mtd")]
    vboot: Option<VbootArg>,

    /// Copy of /proc/mtd used to detect a vboot system
    #[arg(long, value_name = "FILE")]
    proc_mtd: Option<PathBuf>,

    /// Captured `vboot-util` output
    #[arg(long, value_name = "FILE", requires = "proc_mtd")]
    vboot_util: Option<PathBuf>,
}

impl VbootArgs {
    fn source(&self) -> VbootSource {
        VbootSource {
            enforcement: self.vboot.map(VbootEnforcement::from),
            proc_mtd: self.proc_mtd.clone(),
            vboot_util: self.vboot_util.clone(),
        }
    }
}

fn run_validate(image: &Path, formats: &FormatArgs, vboot: &VbootArgs) -> anyhow::Result<()> {
    let formats = formats.load()?;
    let enforcement = vboot.source().resolve()?;
    let data = std::fs::read(image)
        .with_context(|| format!("Failed to read image {}", image.display()))?;
    let registry = PartitionRegistry::with_default_validators()?;

    log::info!(
        "Validating {} ({} bytes), vboot enforcement {:?}",
        image.display(),
        data.len(),
        enforcement
    );
    let format = validate(&enforcement, &registry, &data, &formats)
        .with_context(|| format!("Image {} failed validation", image.display()))?;

    println!("{}: valid '{}' image", image.display(), format.name);
    Ok(())
}

fn run_list_formats(formats: &FormatArgs) -> anyhow::Result<()> {
    let config = FormatsConfig {
        formats: formats.load()?,
    };
    print!("{}", toml::to_string(&config)?);
    Ok(())
}

fn run_vboot_status(vboot: &VbootArgs) -> anyhow::Result<()> {
    let enforcement = vboot.source().resolve()?;
    println!("{}", serde_json::to_string(&enforcement)?.trim_matches('"'));
    Ok(())
}

/// Entry point
fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = SimpleLogger::new().with_level(level).init();

    let result = match &cli.command {
        Commands::Validate {
            image,
            formats,
            vboot,
        } => run_validate(image, formats, vboot),
        Commands::ListFormats { formats } => run_list_formats(formats),
        Commands::VbootStatus { vboot } => run_vboot_status(vboot),
    };

    result.unwrap_or_else(|e| {
        log::error!("Error: {:#}", e);
        std::process::exit(1);
    });
}
