use std::env;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use env_logger::Builder;
use log::{self, debug, error, info, LevelFilter};

use ngs_qc_pipelines::cli::parse;
use ngs_qc_pipelines::config::defs::{PipelineError, RunConfig};
use ngs_qc_pipelines::pipelines::{build_indexes, fastq_screen, illumina_qc, run_qc, solid_qc};
use ngs_qc_pipelines::utils::system::detect_cores_and_load;


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n NGS QC\n-------------\n");

    let dir = env::current_dir()?;
    info!("The current directory is {:?}\n", dir);

    let (physical_cores, cpu_load) = detect_cores_and_load().await?;
    debug!("Detected {} physical cores; CPU load {}%", physical_cores, cpu_load);

    let module = args.module.clone();
    let run_config = Arc::new(RunConfig {
        cwd: dir,
        args,
        physical_cores,
    });

    if let Err(e) = match module.as_str() {
        "run_qc_pipeline" => run_qc::run(run_config).await,
        "solid_qc" => solid_qc::run(run_config).await,
        "illumina_qc" => illumina_qc::run(run_config).await,
        "fastq_screen" => fastq_screen::run(run_config).await,
        "build_indexes" => build_indexes::run(run_config).await,
        _ => Err(PipelineError::InvalidConfig(format!("Invalid module: {}", module))),
    } {
        error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}
