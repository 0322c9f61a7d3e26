mod assets;
mod book;
mod canvas;
mod compose;
mod config;
mod debug;
mod doc_template;
mod error;
mod flowable;
mod font;
mod frame;
mod harness;
mod html;
mod markdown;
mod metrics;
mod page_template;
mod pdf;
mod pdfinspect;
mod perf;
mod types;
mod verify;

pub use assets::{AssetLibrary, ImageAsset, ImageKind};
pub use book::{Book, BookMetadata, Chapter, Theme, load_book, load_chapters, load_metadata};
pub use canvas::{Canvas, Command, Document, Page};
pub use compose::{Composition, compose};
pub use config::{LayoutDelta, LayoutOptions, VerifyOptions};
use debug::DebugLogger;
pub use doc_template::DocTemplate;
pub use error::PressError;
pub use flowable::{
    BreakAfter, BreakBefore, BreakInside, CalloutBox, CodeBlock, Flowable, ImageFlowable,
    Pagination, Paragraph, PlaceholderFlowable, Rule, Spacer, Span, TextAlign,
};
pub use font::{BuiltinFont, FontFamily};
pub use frame::{AddResult, Frame};
pub use galleypress_qa_contract::{
    CheckDef, CheckStage, Issue, QaProfile, QaReport, Severity, check_def, check_defs_v1,
    contract_fingerprint_sha256,
};
pub use harness::{
    AttemptRecord, HarnessOutcome, HarnessState, MAX_ATTEMPT_CEILING, RetryPolicy,
    corrective_delta, run_with_retry,
};
pub use html::render_html;
pub use markdown::{Block, Inline, parse_markdown};
pub use metrics::{DocumentMetrics, PageMetrics};
pub use page_template::{FrameSpec, PageContext, PageTemplate};
pub use pdf::{PdfMetadata, write_pdf};
pub use pdfinspect::{
    PdfInspectError, PdfInspectErrorCode, PdfInspectReport, inspect_pdf_bytes, inspect_pdf_path,
};
use perf::PerfLogger;
pub use types::{Color, Margins, Pt, Rect, Shading, ShadingStop, Size};
pub use verify::{
    LayoutProbe, SyntheticPage, SyntheticProbe, verify_artifact, verify_existing_pdf,
    verify_html, verify_layout,
};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Configures one press run. Mirrors the project conventions: `book.yaml`
/// and `chapters/` and `images/` under the project directory, the PDF under
/// `dist/`, QA artifacts under `build/qa/` when requested.
#[derive(Clone)]
pub struct PressBuilder {
    project_dir: PathBuf,
    output_path: PathBuf,
    html_path: Option<PathBuf>,
    qa_dir: Option<PathBuf>,
    debug_path: Option<PathBuf>,
    perf_path: Option<PathBuf>,
    layout: LayoutOptions,
    verify: VerifyOptions,
    policy: RetryPolicy,
}

impl PressBuilder {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        let output_path = project_dir.join("dist").join("book.pdf");
        Self {
            project_dir,
            output_path,
            html_path: None,
            qa_dir: None,
            debug_path: None,
            perf_path: None,
            layout: LayoutOptions::default(),
            verify: VerifyOptions::default(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    /// Also write the rendered HTML next to the PDF for inspection.
    pub fn html_debug(mut self, path: impl Into<PathBuf>) -> Self {
        self.html_path = Some(path.into());
        self
    }

    pub fn qa_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.qa_dir = Some(path.into());
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn perf_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.perf_path = Some(path.into());
        self
    }

    pub fn layout(mut self, layout: LayoutOptions) -> Self {
        self.layout = layout;
        self
    }

    pub fn verify(mut self, verify: VerifyOptions) -> Self {
        self.verify = verify;
        self
    }

    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Result<Press, PressError> {
        self.layout.validate()?;
        self.policy.validate()?;
        let debug = match &self.debug_path {
            Some(path) => Some(Arc::new(DebugLogger::new(path)?)),
            None => None,
        };
        let perf = match &self.perf_path {
            Some(path) => Some(Arc::new(PerfLogger::new(path)?)),
            None => None,
        };
        Ok(Press {
            project_dir: self.project_dir,
            output_path: self.output_path,
            html_path: self.html_path,
            qa_dir: self.qa_dir,
            layout: self.layout,
            verify: self.verify,
            policy: self.policy,
            debug,
            perf,
        })
    }
}

pub struct Press {
    project_dir: PathBuf,
    output_path: PathBuf,
    html_path: Option<PathBuf>,
    qa_dir: Option<PathBuf>,
    layout: LayoutOptions,
    verify: VerifyOptions,
    policy: RetryPolicy,
    debug: Option<Arc<DebugLogger>>,
    perf: Option<Arc<PerfLogger>>,
}

#[derive(Debug)]
pub struct PressRun {
    pub outcome: HarnessOutcome,
    pub output_path: PathBuf,
    pub page_count: usize,
}

impl Press {
    /// Loads the project once, then drives the generate-and-verify loop to
    /// completion. Input errors abort before the first attempt; render and
    /// write failures consume the retry budget.
    pub fn run(&self) -> Result<PressRun, PressError> {
        let load_start = Instant::now();
        let book = load_book(&self.project_dir)?;
        let assets = AssetLibrary::load(&self.project_dir.join("images"));
        self.log_stage("load", 0, load_start);
        if let Some(debug) = &self.debug {
            for name in assets.skipped() {
                debug.event("assets.skipped", &[("name", name)]);
                debug.increment("assets.skipped", 1);
            }
            debug.event(
                "press.start",
                &[
                    ("title", &book.metadata.title),
                    ("chapters", &book.chapter_count().to_string()),
                    ("images", &assets.len().to_string()),
                ],
            );
        }

        if let Some(parent) = self.output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Some(qa_dir) = &self.qa_dir {
            fs::create_dir_all(qa_dir)?;
        }

        let mut last_page_count = 0usize;
        let outcome = run_with_retry(self.layout.clone(), &self.policy, |attempt, options| {
            self.attempt(attempt, options, &book, &assets, &mut last_page_count)
        });

        if let Some(debug) = &self.debug {
            debug.emit_summary("press.run");
            debug.flush();
        }
        if let Some(perf) = &self.perf {
            perf.emit_totals();
            perf.flush();
        }

        Ok(PressRun {
            outcome: outcome?,
            output_path: self.output_path.clone(),
            page_count: last_page_count,
        })
    }

    fn attempt(
        &self,
        attempt: usize,
        options: &LayoutOptions,
        book: &Book,
        assets: &AssetLibrary,
        last_page_count: &mut usize,
    ) -> Result<QaReport, PressError> {
        let html_start = Instant::now();
        let html = render_html(book, assets, options);
        self.log_stage("html_render", attempt, html_start);

        let layout_start = Instant::now();
        let composition = compose(book, assets, options);
        let mut template = DocTemplate::new(composition.templates);
        if let Some(debug) = &self.debug {
            template = template.with_debug(debug.clone());
        }
        for flowable in composition.story {
            template.add_flowable(flowable);
        }
        let (document, metrics) = template.build_with_metrics()?;
        *last_page_count = document.pages.len();
        self.log_stage("layout", attempt, layout_start);
        if let Some(debug) = &self.debug {
            debug.event(
                "layout.done",
                &[
                    ("attempt", &attempt.to_string()),
                    ("pages", &metrics.page_count().to_string()),
                    ("ms", &format!("{:.1}", metrics.total_render_ms)),
                ],
            );
        }

        let pdf_start = Instant::now();
        let pdf_metadata = PdfMetadata::for_book(
            book.metadata.title.clone(),
            book.metadata.author.clone(),
            book.metadata.language.clone(),
        );
        let pdf_bytes = write_pdf(&document, assets, &pdf_metadata)?;
        fs::write(&self.output_path, &pdf_bytes)?;
        if let Some(html_path) = &self.html_path {
            if let Some(parent) = html_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(html_path, &html)?;
        }
        self.log_stage("pdf_write", attempt, pdf_start);

        let verify_start = Instant::now();
        let inspection = inspect_pdf_bytes(&pdf_bytes);
        let mut issues = verify_layout(&document, options, &self.verify);
        issues.extend(verify_html(&html, book.chapter_count(), &book.metadata.theme));
        issues.extend(verify_artifact(&inspection, document.pages.len(), options));
        let report = QaReport::from_issues(self.policy.profile, attempt, issues)
            .with_artifact(self.output_path.display().to_string(), &pdf_bytes);
        self.log_stage("verify", attempt, verify_start);

        if let Some(debug) = &self.debug {
            debug.event(
                "verify.done",
                &[
                    ("attempt", &attempt.to_string()),
                    ("passed", if report.passed { "true" } else { "false" }),
                    ("issues", &report.issues.len().to_string()),
                ],
            );
            debug.increment("verify.attempts", 1);
        }
        if let Some(qa_dir) = &self.qa_dir {
            let path = qa_dir.join(format!("qa-attempt-{attempt:02}.json"));
            fs::write(path, report.to_json())?;
        }
        Ok(report)
    }

    fn log_stage(&self, stage: &str, attempt: usize, start: Instant) {
        if let Some(perf) = &self.perf {
            perf.log_stage_ms(stage, attempt, start.elapsed().as_secs_f64() * 1000.0);
        }
    }
}

/// Verifies an already-built PDF with no project context, the `check`
/// command's path.
pub fn check_pdf(
    path: &Path,
    layout: &LayoutOptions,
    verify: &VerifyOptions,
    profile: QaProfile,
) -> QaReport {
    let inspection = inspect_pdf_path(path);
    let issues = verify_existing_pdf(&inspection, layout, verify);
    let mut report = QaReport::from_issues(profile, 1, issues);
    if let Ok(bytes) = fs::read(path) {
        report = report.with_artifact(path.display().to_string(), &bytes);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_project(dir: &Path) {
        fs::write(
            dir.join("book.yaml"),
            "title: The Proof Margin\nsubtitle: Galley Notes\nauthor: R. Example\ntheme:\n  accent: \"#3b6fe0\"\n",
        )
        .expect("metadata");
        let chapters = dir.join("chapters");
        fs::create_dir_all(&chapters).expect("chapters dir");
        fs::write(
            chapters.join("chapter-01-setting.md"),
            "---\ntitle: Setting the Measure\n---\n\
             The measure of a page is decided long before any ink is committed to paper.\n\n\
             > **Note:** trim size is fixed at six by nine inches for every edition.\n\n\
             - the measure holds the text block\n\
             - the margins hold the thumbs\n",
        )
        .expect("chapter 1");
        fs::write(
            chapters.join("chapter-02-breaking.md"),
            "# Breaking Pages\n\n\
             Page breaking is a negotiation between paragraphs and the frames that hold them together.\n\n\
             ```text\nwrap -> split -> place\n```\n",
        )
        .expect("chapter 2");
        let images = dir.join("images");
        fs::create_dir_all(&images).expect("images dir");
        fs::write(images.join("cover.png"), crate::assets::tests::png_bytes(60, 90))
            .expect("cover");
    }

    #[test]
    fn end_to_end_build_passes_and_writes_artifacts() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_project(dir.path());
        let out = dir.path().join("dist/book.pdf");
        let qa = dir.path().join("build/qa");
        let press = PressBuilder::new(dir.path())
            .output_path(&out)
            .html_debug(dir.path().join("build/book.html"))
            .qa_dir(&qa)
            .debug_log(dir.path().join("build/debug.ndjson"))
            .perf_log(dir.path().join("build/perf.ndjson"))
            .build()
            .expect("builder");
        let run = press.run().expect("run");
        assert!(run.outcome.passed, "report: {:?}", run.outcome.final_report);
        // Deterministic inputs: first verification passes, debounce pass
        // confirms, so exactly required_passes attempts.
        assert_eq!(run.outcome.attempts, RetryPolicy::default().required_passes);
        assert!(run.page_count >= 5, "cover, toc, chapters, colophon");

        let report = inspect_pdf_path(&out).expect("inspect");
        assert_eq!(report.page_count, run.page_count);
        assert_eq!(report.media_box_size(), Some((432.0, 648.0)));
        assert_eq!(report.title.as_deref(), Some("The Proof Margin"));

        assert!(dir.path().join("build/book.html").exists());
        assert!(qa.join("qa-attempt-01.json").exists());
        assert!(qa.join("qa-attempt-02.json").exists());
        let qa_json =
            fs::read_to_string(qa.join("qa-attempt-02.json")).expect("qa report");
        let parsed: QaReport = serde_json::from_str(&qa_json).expect("parse report");
        assert!(parsed.passed);
        assert!(parsed.artifact.is_some());
    }

    #[test]
    fn repeated_runs_emit_identical_pdfs() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_project(dir.path());
        let out = dir.path().join("dist/book.pdf");
        let press = PressBuilder::new(dir.path())
            .output_path(&out)
            .build()
            .expect("builder");
        press.run().expect("first run");
        let first = fs::read(&out).expect("read first");
        press.run().expect("second run");
        let second = fs::read(&out).expect("read second");
        assert_eq!(first, second);
    }

    #[test]
    fn missing_project_fails_before_consuming_attempts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let press = PressBuilder::new(dir.path()).build().expect("builder");
        match press.run() {
            Err(PressError::MissingMetadata(_)) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn check_pdf_reports_on_built_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_project(dir.path());
        let out = dir.path().join("dist/book.pdf");
        let press = PressBuilder::new(dir.path())
            .output_path(&out)
            .build()
            .expect("builder");
        press.run().expect("run");

        let report = check_pdf(
            &out,
            &LayoutOptions::default(),
            &VerifyOptions::default(),
            QaProfile::Lenient,
        );
        assert!(report.passed, "issues: {:?}", report.issues);

        let missing = check_pdf(
            &dir.path().join("dist/ghost.pdf"),
            &LayoutOptions::default(),
            &VerifyOptions::default(),
            QaProfile::Lenient,
        );
        assert!(!missing.passed);
        assert_eq!(missing.issues[0].check_id, "gp.artifact.pdf_parses");
    }
}
