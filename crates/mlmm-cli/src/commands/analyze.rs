use crate::cli::AnalyzeArgs;
use crate::error::Result;
use mlmm::analysis::RmseReport;
use mlmm::workflows;
use tracing::info;

pub async fn run(args: AnalyzeArgs) -> Result<()> {
    info!("Analysing embedding energies in {:?}", &args.input);
    let report = workflows::analyze::run(&args.input, args.scale)?;
    println!("{}", format_report(&report, &args.units));
    Ok(())
}

fn format_report(report: &RmseReport, units: &str) -> String {
    format!(
        "Samples:       {}\nStatic RMSE:   {:.6} {units}\nInduced RMSE:  {:.6} {units}\nTotal RMSE:    {:.6} {units}",
        report.samples, report.static_rmse, report.induced_rmse, report.total_rmse
    )
}
