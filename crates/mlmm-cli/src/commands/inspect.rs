use crate::cli::InspectArgs;
use crate::error::Result;
use mlmm::core::io::dcd::{DcdReader, DcdSummary};
use tracing::info;

pub async fn run(args: InspectArgs) -> Result<()> {
    info!("Reading trajectory header from {:?}", &args.trajectory);
    let reader = DcdReader::open(&args.trajectory)?;
    println!("{}", format_summary(reader.summary()));
    Ok(())
}

fn format_summary(summary: &DcdSummary) -> String {
    let timestep_fs = summary.timestep_ps * 1000.0;
    let span_ps = summary.frames as f64 * summary.interval as f64 * summary.timestep_ps;
    let mut lines = Vec::new();
    if !summary.title.is_empty() {
        lines.push(format!("Title:       {}", summary.title));
    }
    lines.push(format!("Atoms:       {}", summary.atoms));
    lines.push(format!("Frames:      {}", summary.frames));
    lines.push(format!("Timestep:    {:.4} fs", timestep_fs));
    lines.push(format!(
        "First step:  {} (every {} steps, {:.3} ps covered)",
        summary.first_step, summary.interval, span_ps
    ));
    lines.push(format!(
        "Unit cell:   {}",
        if summary.has_unit_cell { "yes" } else { "no" }
    ));
    lines.join("\n")
}
