use colored::Colorize;
use sortkit_spec::{ExecutionResult, FailureRecord};

/// Prints a run outcome in human-readable form.
pub(crate) fn print_result(result: &ExecutionResult) {
    match result {
        ExecutionResult::Completed(report) => {
            println!(
                "{} {} units at {} Hz",
                "Completed:".green().bold(),
                report.sorting.num_units(),
                report.sampling_frequency()
            );
            println!("  {} {}", "->".green(), report.output_folder.display());
            for dropped in &report.dropped {
                println!(
                    "  {} partition {} dropped: {}",
                    "!".yellow(),
                    dropped.partition,
                    dropped.failure.message
                );
            }
        }
        ExecutionResult::Failed(failure) => print_failure(failure),
    }
}

/// Prints a recorded failure, including the backend diagnostic.
pub(crate) fn print_failure(failure: &FailureRecord) {
    eprintln!(
        "{} [{}] {}",
        "Failed:".red().bold(),
        failure.kind,
        failure.message
    );
    if let Some(diagnostic) = &failure.diagnostic {
        for line in diagnostic.lines() {
            eprintln!("  {}", line.dimmed());
        }
    }
}
