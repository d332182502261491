use filmdb::{FilmdbConfig, OutputFormat, SchemaVerifier};

use super::{connect, fail, print_json, render_table};

pub async fn run(config: &FilmdbConfig, output_format: OutputFormat) {
    let conn = connect(config).await;

    let report = match SchemaVerifier::new(&conn).run().await {
        Ok(report) => report,
        Err(e) => fail(&e),
    };

    if !print_json(&report, output_format) {
        println!("{}", render_table(&report.probes, output_format));
        if report.all_passed() {
            println!("All {} probes passed", report.probes.len());
        } else {
            println!(
                "{} of {} probes failed",
                report.failed_count(),
                report.probes.len()
            );
        }
    }

    if !report.all_passed() {
        std::process::exit(1);
    }
}
