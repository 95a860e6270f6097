use coverprofile::{
    aggregate, from_reader, Error, FileRenderer, ModuleSummary, RenderJob, RenderPool, Result,
    StatementCounts,
};
use std::collections::HashSet;
use std::io::{self, Cursor, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

/// Records which thread rendered each module.
#[derive(Default)]
struct RecordingRenderer {
    seen: Mutex<Vec<(String, String)>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FileRenderer for RecordingRenderer {
    fn render_file(&self, job: &RenderJob) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(2));

        let thread_name = thread::current().name().unwrap_or_default().to_string();
        self.seen
            .lock()
            .unwrap()
            .push((job.summary.display_file.clone(), thread_name));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if job.summary.display_file.starts_with("broken") {
            return Err(Error::Io(io::Error::new(io::ErrorKind::NotFound, "gone")));
        }
        Ok(())
    }
}

fn job(module: &str) -> RenderJob {
    RenderJob {
        summary: Arc::new(ModuleSummary {
            display_file: module.to_string(),
            html_link: format!("{module}.html"),
            counts: StatementCounts::new(0, 1),
            reached_ranges: Default::default(),
            missed_ranges: Default::default(),
        }),
        output: PathBuf::from(format!("{module}.html")),
        package: Arc::from("example.com/m"),
    }
}

#[test]
fn test_jobs_run_on_named_workers() {
    let renderer = Arc::new(RecordingRenderer::default());
    let mut pool = RenderPool::spawn(3, renderer.clone()).unwrap();
    for i in 0..12 {
        pool.dispatch(job(&format!("m{i}.go"))).unwrap();
    }
    let report = pool.join();

    assert_eq!(report.rendered, 12);
    let seen = renderer.seen.lock().unwrap();
    assert_eq!(seen.len(), 12);
    let modules: HashSet<_> = seen.iter().map(|(m, _)| m.as_str()).collect();
    assert_eq!(modules.len(), 12);
    assert!(seen.iter().all(|(_, t)| t.starts_with("render-")));
    assert!(renderer.peak.load(Ordering::SeqCst) <= 3);
}

#[test]
fn test_join_waits_for_all_work() {
    let renderer = Arc::new(RecordingRenderer::default());
    let mut pool = RenderPool::spawn(2, renderer.clone()).unwrap();
    for i in 0..6 {
        pool.dispatch(job(&format!("m{i}.go"))).unwrap();
    }
    let report = pool.join();

    assert_eq!(report.completed(), 6);
    assert_eq!(renderer.in_flight.load(Ordering::SeqCst), 0);
    assert_eq!(renderer.seen.lock().unwrap().len(), 6);
}

#[test]
fn test_failed_job_does_not_stop_others() {
    let renderer = Arc::new(RecordingRenderer::default());
    let mut pool = RenderPool::spawn(2, renderer).unwrap();
    for module in ["a.go", "broken.go", "b.go", "broken2.go", "c.go"] {
        pool.dispatch(job(module)).unwrap();
    }
    let report = pool.join();

    assert_eq!(report.dispatched, 5);
    assert_eq!(report.rendered, 3);
    assert_eq!(report.failures.len(), 2);
    assert!(report
        .failures
        .iter()
        .all(|f| f.module.starts_with("broken") && f.output.ends_with(format!("{}.html", f.module))));
}

/// Blocks the first render until the test releases it.
struct GatedRenderer {
    gate: Barrier,
    calls: AtomicUsize,
}

impl FileRenderer for GatedRenderer {
    fn render_file(&self, _job: &RenderJob) -> Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.gate.wait();
        }
        Ok(())
    }
}

#[test]
fn test_cancel_skips_queued_jobs() {
    let renderer = Arc::new(GatedRenderer {
        gate: Barrier::new(2),
        calls: AtomicUsize::new(0),
    });
    let mut pool = RenderPool::spawn(1, renderer.clone()).unwrap();
    pool.dispatch(job("first.go")).unwrap();

    // The single worker is parked in the gate, so the next job is handed
    // over only after the gate opens.
    let releaser = {
        let renderer = Arc::clone(&renderer);
        thread::spawn(move || {
            while renderer.calls.load(Ordering::SeqCst) == 0 {
                thread::yield_now();
            }
            renderer.gate.wait();
        })
    };
    pool.dispatch(job("second.go")).unwrap();
    pool.cancel();
    releaser.join().unwrap();
    let report = pool.join();

    assert_eq!(report.dispatched, 2);
    assert_eq!(report.completed(), 2);
    assert_eq!(report.rendered + report.skipped, 2);
    assert!(report.failures.is_empty());
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_workers_log_through_spawning_subscriber() {
    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let renderer = Arc::new(RecordingRenderer::default());
        let mut pool = RenderPool::spawn(2, renderer).unwrap();
        pool.dispatch(job("broken.go")).unwrap();
        pool.dispatch(job("fine.go")).unwrap();
        pool.join();
    });

    let logs = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
    assert!(logs.contains("render failed"), "{logs}");
    assert!(logs.contains("broken.go"), "{logs}");
    assert!(logs.contains("render pool drained"), "{logs}");
}

#[test]
fn test_pool_renders_aggregated_summaries() {
    let profile = from_reader(Cursor::new(
        "mode: set\nb.go:1.1,1.2 1 1\na.go:1.1,1.2 1 0\nc.go:1.1,1.2 1 1\n",
    ))
    .unwrap();
    let report = aggregate(&profile).unwrap();

    let renderer = Arc::new(RecordingRenderer::default());
    let mut pool = RenderPool::spawn(2, renderer.clone()).unwrap();
    for summary in &report.modules {
        pool.dispatch(RenderJob {
            summary: Arc::clone(summary),
            output: PathBuf::from(&summary.html_link),
            package: Arc::from(""),
        })
        .unwrap();
    }
    assert!(pool.join().is_clean());
    assert_eq!(renderer.seen.lock().unwrap().len(), report.modules.len());
}
