use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use log::info;
use structopt::StructOpt;
use tempfile::tempdir;

use petra_engine::analyze;
use petra_shared::config::PATH_STUDIO;
use petra_shared::logging;

#[derive(StructOpt)]
#[structopt(
    name = "petra-engine",
    about = "Flow-sensitive points-to analysis over pointer programs",
    rename_all = "kebab-case"
)]
struct Args {
    /// Studio directory
    #[structopt(short, long)]
    studio: Option<PathBuf>,

    /// Verbosity
    #[structopt(short, long, parse(from_occurrences))]
    verbose: usize,

    /// Keep the analysis artifacts in the studio
    #[structopt(short, long)]
    keep: bool,

    /// Program description in JSON
    input: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::from_args();
    let Args {
        studio,
        verbose,
        keep,
        input,
    } = args;
    let studio = studio.as_ref().unwrap_or(&PATH_STUDIO);

    // setup logging
    logging::setup(Some(verbose))?;

    // decide on the workspace
    let (temp, output) = if keep {
        let path = studio.join("petra");
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        fs::create_dir_all(&path)?;
        (None, path)
    } else {
        let dir = tempdir()?;
        let path = dir.path().to_path_buf();
        (Some(dir), path)
    };

    // run the analysis
    let summary = analyze(&input)?;
    let summary_path = output.join("points-to.txt");
    fs::write(&summary_path, summary.to_string())?;
    info!(
        "Points-to summary saved at {}",
        summary_path
            .into_os_string()
            .to_str()
            .unwrap_or("<non-ascii-path>")
    );

    // drop temp dir explicitly
    match temp {
        None => (),
        Some(dir) => {
            dir.close()?;
        }
    };

    // done with everything
    Ok(())
}
