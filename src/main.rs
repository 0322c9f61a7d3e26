use clap::{Parser, Subcommand};
use galleypress::{
    HarnessState, LayoutOptions, Margins, PressBuilder, PressError, Pt, QaProfile, QaReport,
    RetryPolicy, VerifyOptions, check_pdf,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "galleypress",
    version,
    about = "Assembles a book project into a verified 6x9 PDF"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the book and retry until the QA battery passes.
    Build {
        /// Project directory holding book.yaml, chapters/, images/.
        #[arg(default_value = ".")]
        project_dir: PathBuf,
        /// Output PDF path; defaults to <project>/dist/book.pdf.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Also write the rendered HTML under <project>/build/.
        #[arg(long)]
        html: bool,
        /// Retry ceiling for the generate-then-verify loop.
        #[arg(long, default_value_t = 4)]
        attempts: usize,
        /// Consecutive passing verifications required.
        #[arg(long, default_value_t = 2)]
        passes: usize,
        /// QA gate profile: strict or lenient.
        #[arg(long, default_value = "lenient")]
        profile: String,
        /// Exact page count the verifier should demand.
        #[arg(long)]
        expected_pages: Option<usize>,
        /// Directory for QA reports; defaults to <project>/build/qa.
        #[arg(long)]
        qa_dir: Option<PathBuf>,
        /// NDJSON debug event log path.
        #[arg(long)]
        debug_log: Option<PathBuf>,
        /// NDJSON stage timing log path.
        #[arg(long)]
        perf_log: Option<PathBuf>,
        /// Uniform page margin in inches.
        #[arg(long)]
        margin_in: Option<f32>,
        /// Body font size in points.
        #[arg(long)]
        body_font_pt: Option<f32>,
    },
    /// Verify an already-built PDF.
    Check {
        /// PDF to inspect; defaults to dist/book.pdf.
        pdf: Option<PathBuf>,
        #[arg(long)]
        expected_pages: Option<usize>,
        #[arg(long, default_value = "lenient")]
        profile: String,
    },
}

fn main() -> ExitCode {
    match Cli::parse().command {
        Commands::Build {
            project_dir,
            out,
            html,
            attempts,
            passes,
            profile,
            expected_pages,
            qa_dir,
            debug_log,
            perf_log,
            margin_in,
            body_font_pt,
        } => {
            let Some(profile) = QaProfile::from_str(&profile) else {
                eprintln!("✗ unknown profile '{profile}' (strict or lenient)");
                return ExitCode::FAILURE;
            };
            let mut layout = LayoutOptions::default();
            if let Some(margin) = margin_in {
                layout.margins = Margins::uniform_inches(margin);
            }
            if let Some(size) = body_font_pt {
                layout.body_font = Pt::from_f32(size);
            }
            let verify = VerifyOptions {
                expected_pages,
                ..VerifyOptions::default()
            };
            let policy = RetryPolicy {
                max_attempts: attempts,
                required_passes: passes,
                profile,
            };
            let output = out.unwrap_or_else(|| project_dir.join("dist").join("book.pdf"));
            let mut builder = PressBuilder::new(&project_dir)
                .output_path(&output)
                .qa_dir(qa_dir.unwrap_or_else(|| project_dir.join("build").join("qa")))
                .layout(layout)
                .verify(verify)
                .policy(policy);
            if html {
                builder = builder.html_debug(project_dir.join("build").join("book.html"));
            }
            if let Some(path) = debug_log {
                builder = builder.debug_log(path);
            }
            if let Some(path) = perf_log {
                builder = builder.perf_log(path);
            }

            println!("→ building {}", project_dir.display());
            let press = match builder.build() {
                Ok(press) => press,
                Err(err) => return fail(err),
            };
            match press.run() {
                Ok(run) => {
                    for record in &run.outcome.trail {
                        let marker = match record.state {
                            HarnessState::Passed => "✓",
                            HarnessState::Verifying => "→",
                            _ => "✗",
                        };
                        match record.delta {
                            Some(delta) => println!(
                                "{marker} attempt {}: {:?} (next: {:?})",
                                record.attempt, record.state, delta
                            ),
                            None => {
                                println!("{marker} attempt {}: {:?}", record.attempt, record.state)
                            }
                        }
                    }
                    if let Some(report) = &run.outcome.final_report {
                        print_issues(report);
                    }
                    if run.outcome.passed {
                        println!(
                            "✓ {} ({} pages, {} attempt{})",
                            run.output_path.display(),
                            run.page_count,
                            run.outcome.attempts,
                            if run.outcome.attempts == 1 { "" } else { "s" }
                        );
                        ExitCode::SUCCESS
                    } else {
                        println!(
                            "✗ gave up after {} attempts; last artifact kept at {}",
                            run.outcome.attempts,
                            run.output_path.display()
                        );
                        ExitCode::FAILURE
                    }
                }
                Err(err) => fail(err),
            }
        }
        Commands::Check {
            pdf,
            expected_pages,
            profile,
        } => {
            let Some(profile) = QaProfile::from_str(&profile) else {
                eprintln!("✗ unknown profile '{profile}' (strict or lenient)");
                return ExitCode::FAILURE;
            };
            let path = pdf.unwrap_or_else(|| PathBuf::from("dist/book.pdf"));
            let verify = VerifyOptions {
                expected_pages,
                ..VerifyOptions::default()
            };
            println!("→ checking {}", path.display());
            let report = check_pdf(&path, &LayoutOptions::default(), &verify, profile);
            print_issues(&report);
            if report.passed {
                println!("✓ {} looks press-ready", path.display());
                ExitCode::SUCCESS
            } else {
                println!("✗ {} failed verification", path.display());
                ExitCode::FAILURE
            }
        }
    }
}

fn print_issues(report: &QaReport) {
    for issue in &report.issues {
        let page = issue
            .page
            .map(|p| format!(" p{p}"))
            .unwrap_or_default();
        println!(
            "  [{}{}] {}: {}",
            issue.severity.as_str(),
            page,
            issue.check_id,
            issue.detail
        );
    }
}

fn fail(err: PressError) -> ExitCode {
    eprintln!("✗ {err}");
    ExitCode::FAILURE
}
