mod common;

use async_trait::async_trait;
use common::{FakeBrowser, FakePage, RecordingReporter, SharedBuffer};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use synthetics_runner::dsl::{HookKind, MonitorConfig, hook};
use synthetics_runner::{
    JsonReporter, JourneyOptions, ResumeSignal, RunOptions, Runner, ScreenshotPolicy, Status,
    SyntheticsError,
};
use tempfile::TempDir;
use tokio::sync::Notify;

fn runner(browser: &Arc<FakeBrowser>, cache: &TempDir) -> Runner {
    Runner::new(browser.clone()).with_cache_root(cache.path())
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

#[tokio::test]
async fn test_failing_step_skips_the_rest() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let reporter = RecordingReporter::default();
    let runner = runner(&browser, &cache).with_reporter(reporter.clone());
    let fourth_ran = counter();

    let ran = fourth_ran.clone();
    runner.journey("checkout", move |j| {
        j.step("open", |_| async { Ok(()) });
        j.step("add to cart", |_| async { Ok(()) });
        j.step("pay", |_| async { anyhow::bail!("field missing") });
        let ran = ran.clone();
        j.step("confirm", move |_| {
            let ran = ran.clone();
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
    });

    let results = runner.run(RunOptions::default()).await;
    let result = &results["checkout"];

    assert_eq!(result.status, Status::Failed);
    assert_eq!(result.error.as_ref().unwrap().message, "field missing");
    let statuses: Vec<Status> = result.steps.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![Status::Succeeded, Status::Succeeded, Status::Failed, Status::Skipped]
    );
    assert_eq!(fourth_ran.load(Ordering::SeqCst), 0);

    assert_eq!(
        reporter.events(),
        vec![
            "start:1",
            "journey_start:checkout",
            "step_start:open",
            "step_end:open:succeeded",
            "step_start:add to cart",
            "step_end:add to cart:succeeded",
            "step_start:pay",
            "step_end:pay:failed",
            "step_start:confirm",
            "step_end:confirm:skipped",
            "journey_end:checkout:failed",
            "end",
        ]
    );

    assert_eq!(browser.recorder.contexts_created.load(Ordering::SeqCst), 1);
    assert_eq!(browser.recorder.contexts_closed.load(Ordering::SeqCst), 1);
    assert_eq!(browser.recorder.requests_disposed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_journeys_run_in_isolated_contexts() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let runner = runner(&browser, &cache);
    for name in ["first", "second", "third"] {
        runner.journey(name, |j| {
            j.step("noop", |_| async { Ok(()) });
        });
    }

    let results = runner.run(RunOptions::default()).await;

    assert_eq!(results.len(), 3);
    assert!(results.values().all(|r| r.status == Status::Succeeded));
    assert_eq!(browser.recorder.contexts_created.load(Ordering::SeqCst), 3);
    assert_eq!(browser.recorder.contexts_closed.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_before_hooks_run_concurrently() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let runner = runner(&browser, &cache);
    let rendezvous = Arc::new(tokio::sync::Barrier::new(2));

    let shared = rendezvous.clone();
    runner.journey("hooks", move |j| {
        for _ in 0..2 {
            let barrier = shared.clone();
            j.before(move |_| {
                let barrier = barrier.clone();
                async move {
                    barrier.wait().await;
                    Ok(())
                }
            });
        }
        j.step("noop", |_| async { Ok(()) });
    });

    let results = tokio::time::timeout(Duration::from_secs(5), runner.run(RunOptions::default()))
        .await
        .expect("hooks of one phase must not run one after another");
    assert_eq!(results["hooks"].status, Status::Succeeded);
}

#[tokio::test]
async fn test_before_all_failure_fails_every_journey() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let reporter = RecordingReporter::default();
    let runner = runner(&browser, &cache).with_reporter(reporter.clone());
    let after_all = counter();
    let steps_ran = counter();

    runner
        .add_hook(
            HookKind::BeforeAll,
            hook(|_| async { anyhow::bail!("seed data unavailable") }),
        )
        .unwrap();
    let count = after_all.clone();
    runner
        .add_hook(
            HookKind::AfterAll,
            hook(move |_| {
                let count = count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .unwrap();

    for name in ["a", "b"] {
        let ran = steps_ran.clone();
        runner.journey(name, move |j| {
            let ran = ran.clone();
            j.step("never", move |_| {
                let ran = ran.clone();
                async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        });
    }

    let results = runner.run(RunOptions::default()).await;

    assert_eq!(results.len(), 2);
    for result in results.values() {
        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.error.as_ref().unwrap().message, "seed data unavailable");
        assert!(result.steps.is_empty());
    }
    assert_eq!(after_all.load(Ordering::SeqCst), 1);
    assert_eq!(steps_ran.load(Ordering::SeqCst), 0);
    assert_eq!(browser.recorder.contexts_created.load(Ordering::SeqCst), 0);
    assert_eq!(
        reporter.events(),
        vec![
            "start:2",
            "journey_start:a",
            "journey_end:a:failed",
            "journey_start:b",
            "journey_end:b:failed",
            "end",
        ]
    );
}

#[tokio::test]
async fn test_journey_hooks_outside_journey_are_rejected() {
    let browser = FakeBrowser::new();
    let runner = Runner::new(browser);
    let err = runner
        .add_hook(HookKind::Before, hook(|_| async { Ok(()) }))
        .unwrap_err();
    assert!(matches!(err, SyntheticsError::HookOutsideJourney(_)));
    assert!(err.to_string().contains("before"));
}

#[tokio::test]
async fn test_before_hook_failure_skips_steps_and_after_hooks() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let reporter = RecordingReporter::default();
    let runner = runner(&browser, &cache).with_reporter(reporter.clone());
    let after_ran = counter();

    let ran = after_ran.clone();
    runner.journey("guarded", move |j| {
        j.before(|_| async { anyhow::bail!("login expired") });
        let ran = ran.clone();
        j.after(move |_| {
            let ran = ran.clone();
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        j.step("never", |_| async { Ok(()) });
    });

    let results = runner.run(RunOptions::default()).await;
    let result = &results["guarded"];

    assert_eq!(result.status, Status::Failed);
    assert_eq!(result.error.as_ref().unwrap().message, "login expired");
    assert!(result.steps.is_empty());
    assert_eq!(after_ran.load(Ordering::SeqCst), 0);
    assert!(!reporter.events().iter().any(|e| e.starts_with("step_start")));
    assert_eq!(browser.recorder.contexts_closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_after_hook_failure_overrides_step_error() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let runner = runner(&browser, &cache);

    runner.journey("cleanup", |j| {
        j.after(|_| async { anyhow::bail!("cleanup failed") });
        j.step("broken", |_| async { anyhow::bail!("step failed") });
    });
    runner.journey("cleanup only", |j| {
        j.after(|_| async { anyhow::bail!("cleanup failed") });
        j.step("fine", |_| async { Ok(()) });
    });

    let results = runner.run(RunOptions::default()).await;

    for name in ["cleanup", "cleanup only"] {
        let result = &results[name];
        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.error.as_ref().unwrap().message, "cleanup failed");
    }
    assert_eq!(results["cleanup only"].steps[0].status, Status::Succeeded);
}

#[tokio::test]
async fn test_panicking_step_fails_the_journey() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let runner = runner(&browser, &cache);

    runner.journey("panics", |j| {
        j.step("explode", |ctx| async move {
            if ctx.params.is_empty() {
                panic!("selector exploded");
            }
            Ok(())
        });
        j.step("after", |_| async { Ok(()) });
    });
    runner.journey("next", |j| {
        j.step("fine", |_| async { Ok(()) });
    });

    let results = runner.run(RunOptions::default()).await;

    let failed = &results["panics"];
    assert_eq!(failed.status, Status::Failed);
    assert_eq!(failed.error.as_ref().unwrap().message, "selector exploded");
    assert_eq!(failed.steps[1].status, Status::Skipped);
    assert_eq!(results["next"].status, Status::Succeeded);
}

#[tokio::test]
async fn test_context_failure_reports_failed_journey() {
    let browser = FakeBrowser::new();
    browser.fail_context.store(true, Ordering::SeqCst);
    let cache = TempDir::new().unwrap();
    let reporter = RecordingReporter::default();
    let runner = runner(&browser, &cache).with_reporter(reporter.clone());

    runner.journey("offline", |j| {
        j.step("never", |_| async { Ok(()) });
    });

    let results = runner.run(RunOptions::default()).await;
    let result = &results["offline"];

    assert_eq!(result.status, Status::Failed);
    assert!(
        result
            .error
            .as_ref()
            .unwrap()
            .message
            .contains("browser has disconnected")
    );
    assert_eq!(
        reporter.events(),
        vec![
            "start:1",
            "journey_start:offline",
            "journey_end:offline:failed",
            "end"
        ]
    );
}

#[tokio::test]
async fn test_partial_setup_failure_closes_context() {
    let browser = FakeBrowser::new();
    browser.fail_request_context.store(true, Ordering::SeqCst);
    let cache = TempDir::new().unwrap();
    let runner = runner(&browser, &cache);

    runner.journey("half open", |j| {
        j.step("never", |_| async { Ok(()) });
    });
    runner.journey("second", |j| {
        j.step("never", |_| async { Ok(()) });
    });

    let results = runner.run(RunOptions::default()).await;

    assert_eq!(results["half open"].status, Status::Failed);
    assert!(
        results["half open"]
            .error
            .as_ref()
            .unwrap()
            .message
            .contains("request context refused")
    );
    let recorder = &browser.recorder;
    assert_eq!(recorder.contexts_created.load(Ordering::SeqCst), 2);
    assert_eq!(
        recorder.contexts_closed.load(Ordering::SeqCst),
        recorder.contexts_created.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn test_journey_duration_excludes_context_setup() {
    let browser = FakeBrowser::new();
    *browser.setup_delay.lock() = Some(Duration::from_millis(300));
    let cache = TempDir::new().unwrap();
    let output = SharedBuffer::default();
    let runner =
        runner(&browser, &cache).with_reporter(JsonReporter::new(Box::new(output.clone())));

    runner.journey("quick", |j| {
        j.step("noop", |_| async { Ok(()) });
    });
    runner.run(RunOptions::default()).await;

    let lines = output.lines();
    let journey_end = lines.iter().find(|l| l["type"] == "journey/end").unwrap();
    let start = journey_end["payload"]["start"].as_f64().unwrap();
    let end = journey_end["payload"]["end"].as_f64().unwrap();
    assert!(end - start < 0.3, "journey took {}s", end - start);
}

#[tokio::test]
async fn test_tag_filter_selects_journeys() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let runner = runner(&browser, &cache);

    runner.journey(JourneyOptions::new("login").tags(["smoke", "auth"]), |j| {
        j.step("noop", |_| async { Ok(()) });
    });
    runner.journey(JourneyOptions::new("checkout").tags(["regression"]), |j| {
        j.step("noop", |_| async { Ok(()) });
    });
    runner.journey("untagged", |j| {
        j.step("noop", |_| async { Ok(()) });
    });

    let options = RunOptions {
        tags: Some(vec!["smoke".to_string()]),
        ..RunOptions::default()
    };
    let results = runner.run(options).await;

    assert_eq!(results.len(), 1);
    assert!(results.contains_key("login"));
    assert_eq!(browser.recorder.contexts_created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_match_pattern_selects_journeys() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let runner = runner(&browser, &cache);

    for name in ["login page", "login api", "search"] {
        runner.journey(name, |j| {
            j.step("noop", |_| async { Ok(()) });
        });
    }

    let options = RunOptions {
        match_pattern: Some("login*".to_string()),
        ..RunOptions::default()
    };
    let results = runner.run(options).await;

    let mut names: Vec<&String> = results.keys().collect();
    names.sort();
    assert_eq!(names, vec!["login api", "login page"]);
}

#[tokio::test]
async fn test_dry_run_only_registers() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let reporter = RecordingReporter::default();
    let runner = runner(&browser, &cache).with_reporter(reporter.clone());
    let before_all = counter();

    let count = before_all.clone();
    runner
        .add_hook(
            HookKind::BeforeAll,
            hook(move |_| {
                let count = count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .unwrap();
    runner.journey("a", |j| {
        j.step("noop", |_| async { Ok(()) });
    });
    runner.journey("b", |j| {
        j.step("noop", |_| async { Ok(()) });
    });

    let options = RunOptions {
        dry_run: true,
        ..RunOptions::default()
    };
    let results = runner.run(options).await;

    assert!(results.is_empty());
    assert_eq!(
        reporter.events(),
        vec!["start:2", "register:a", "register:b", "end"]
    );
    assert_eq!(before_all.load(Ordering::SeqCst), 0);
    assert_eq!(browser.recorder.contexts_created.load(Ordering::SeqCst), 0);
    assert!(runner.journeys().is_empty());
}

#[tokio::test]
async fn test_registration_is_cleared_after_run() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let runner = runner(&browser, &cache);

    let journey = runner.journey("once", |j| {
        j.step("noop", |_| async { Ok(()) });
    });
    assert_eq!(runner.current_journey().unwrap().name, journey.name);

    runner.run(RunOptions::default()).await;

    assert!(runner.journeys().is_empty());
    assert!(runner.current_journey().is_none());
    assert!(!runner.is_active());
    assert!(runner.run(RunOptions::default()).await.is_empty());
}

#[tokio::test]
async fn test_concurrent_run_returns_nothing() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let runner = Arc::new(runner(&browser, &cache));
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let (started_tx, release_rx) = (started.clone(), release.clone());
    runner.journey("slow", move |j| {
        let (started, release) = (started_tx.clone(), release_rx.clone());
        j.step("wait", move |_| {
            let (started, release) = (started.clone(), release.clone());
            async move {
                started.notify_one();
                release.notified().await;
                Ok(())
            }
        });
    });

    let first = tokio::spawn({
        let runner = runner.clone();
        async move { runner.run(RunOptions::default()).await }
    });

    started.notified().await;
    assert!(runner.is_active());
    assert!(runner.run(RunOptions::default()).await.is_empty());

    release.notify_one();
    let results = first.await.unwrap();
    assert_eq!(results["slow"].status, Status::Succeeded);
    assert!(!runner.is_active());
}

#[derive(Default)]
struct CountingResume {
    waits: AtomicUsize,
}

#[async_trait]
impl ResumeSignal for CountingResume {
    async fn wait(&self) {
        self.waits.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_pause_on_error_waits_for_resume() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let resume = Arc::new(CountingResume::default());
    let runner = runner(&browser, &cache).with_resume_signal(resume.clone());

    runner.journey("fails", |j| {
        j.step("bad", |_| async { anyhow::bail!("nope") });
        j.step("skipped", |_| async { Ok(()) });
    });
    runner.journey("passes", |j| {
        j.step("good", |_| async { Ok(()) });
    });

    let options = RunOptions {
        pause_on_error: true,
        ..RunOptions::default()
    };
    runner.run(options).await;

    assert_eq!(resume.waits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_screenshots_only_on_failure() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let output = SharedBuffer::default();
    let runner =
        runner(&browser, &cache).with_reporter(JsonReporter::new(Box::new(output.clone())));

    runner.journey("passing", |j| {
        j.step("one", |_| async { Ok(()) });
        j.step("two", |_| async { Ok(()) });
    });
    runner.journey("failing", |j| {
        j.step("one", |_| async { Ok(()) });
        j.step("two", |_| async { anyhow::bail!("button not found") });
    });

    let options = RunOptions {
        screenshots: ScreenshotPolicy::OnlyOnFailure,
        ..RunOptions::default()
    };
    runner.run(options).await;

    assert_eq!(browser.recorder.screenshots.load(Ordering::SeqCst), 1);

    let lines = output.lines();
    let screenshots: Vec<_> = lines
        .iter()
        .filter(|l| l["type"] == "step/screenshot")
        .collect();
    assert_eq!(screenshots.len(), 1);
    assert_eq!(screenshots[0]["journey"]["name"], "failing");
    assert_eq!(screenshots[0]["step"]["index"], 2);
    assert_eq!(screenshots[0]["blob_mime"], "image/jpeg");
    assert!(!runner.screenshot_dir().exists());
}

#[tokio::test]
async fn test_screenshots_off_by_default() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let runner = runner(&browser, &cache);
    runner.journey("failing", |j| {
        j.step("bad", |_| async { anyhow::bail!("nope") });
    });

    runner.run(RunOptions::default()).await;
    assert_eq!(browser.recorder.screenshots.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_json_report_lines() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let output = SharedBuffer::default();
    let runner =
        runner(&browser, &cache).with_reporter(JsonReporter::new(Box::new(output.clone())));

    runner.journey(JourneyOptions::new("home").id("home-1"), |j| {
        j.step("visit", |ctx| async move {
            ctx.driver.page.goto("https://example.com/").await?;
            Ok(())
        });
    });

    runner.run(RunOptions::default()).await;

    let lines = output.lines();
    let kinds: Vec<&str> = lines.iter().filter_map(|l| l["type"].as_str()).collect();
    assert_eq!(
        kinds,
        vec!["synthetics/metadata", "journey/start", "step/end", "journey/end"]
    );

    let step_end = &lines[2];
    assert_eq!(step_end["journey"]["id"], "home-1");
    assert_eq!(step_end["step"]["name"], "visit");
    assert_eq!(step_end["step"]["status"], "succeeded");
    assert_eq!(step_end["url"], "https://example.com/");
    assert!(step_end["step"]["duration"]["us"].as_i64().unwrap() >= 0);

    let journey_end = &lines[3];
    assert_eq!(journey_end["journey"]["status"], "succeeded");
    assert_eq!(journey_end["payload"]["status"], "succeeded");
    assert!(journey_end["root_fields"]["package"]["name"].is_string());
}

#[tokio::test]
async fn test_network_capture_tags_steps() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let runner = runner(&browser, &cache);

    runner.journey("navigate", |j| {
        j.step("home", |ctx| async move {
            ctx.driver.page.goto("https://example.com/").await?;
            Ok(())
        });
        j.step("docs", |ctx| async move {
            ctx.driver.page.goto("https://example.com/docs").await?;
            Ok(())
        });
    });

    let options = RunOptions {
        network: true,
        ..RunOptions::default()
    };
    let results = runner.run(options).await;
    let result = &results["navigate"];

    assert_eq!(result.steps[0].url.as_deref(), Some("https://example.com/"));
    assert_eq!(result.steps[1].url.as_deref(), Some("https://example.com/docs"));

    let network = result.networkinfo.as_ref().unwrap();
    assert_eq!(network.len(), 2);
    assert_eq!(network[0].url, "https://example.com/");
    assert_eq!(network[0].step.as_ref().unwrap().index, 1);
    assert_eq!(network[1].step.as_ref().unwrap().name, "docs");
    assert!(network[0].is_navigation_request);
    assert_eq!(network[0].response.status, 200);
    assert_eq!(network[0].browser.as_ref().unwrap().name, "HeadlessChrome");
    assert!(network[0].load_end_time > 0.0);
}

#[tokio::test]
async fn test_first_navigation_of_a_step_is_its_url() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let runner = runner(&browser, &cache);

    runner.journey("hops", |j| {
        j.step("login then land", |ctx| async move {
            ctx.driver.page.goto("https://example.com/login").await?;
            ctx.driver.page.goto("https://example.com/dashboard").await?;
            Ok(())
        });
    });

    let results = runner.run(RunOptions::default()).await;
    let step = &results["hops"].steps[0];

    assert_eq!(step.status, Status::Succeeded);
    assert_eq!(step.url.as_deref(), Some("https://example.com/login"));
}

#[tokio::test]
async fn test_network_capture_disabled_by_default() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let runner = runner(&browser, &cache);
    runner.journey("navigate", |j| {
        j.step("home", |ctx| async move {
            ctx.driver.page.goto("https://example.com/").await?;
            Ok(())
        });
    });

    let results = runner.run(RunOptions::default()).await;
    assert!(results["navigate"].networkinfo.is_none());
    assert_eq!(
        results["navigate"].steps[0].url.as_deref(),
        Some("https://example.com/")
    );
}

#[tokio::test]
async fn test_console_errors_reported_on_failure_only() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let runner = runner(&browser, &cache);

    runner.journey("noisy pass", |j| {
        j.step("log", |ctx| async move {
            FakePage::from_driver(&ctx.driver).console("error", "favicon missing");
            Ok(())
        });
    });
    runner.journey("noisy fail", |j| {
        j.step("log", |ctx| async move {
            let page = FakePage::from_driver(&ctx.driver);
            page.console("log", "debug output");
            page.console("warning", "deprecated api");
            page.page_error("TypeError: x is undefined");
            anyhow::bail!("assertion failed")
        });
    });

    let results = runner.run(RunOptions::default()).await;

    assert!(results["noisy pass"].browserconsole.is_none());
    let messages = results["noisy fail"].browserconsole.as_ref().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].kind, "warning");
    assert_eq!(messages[1].text, "TypeError: x is undefined");
    assert!(messages[1].error.is_some());
    assert_eq!(messages[1].step.name, "log");
}

#[tokio::test]
async fn test_page_metrics_collected_per_step() {
    let browser = FakeBrowser::new();
    let cache = TempDir::new().unwrap();
    let runner = runner(&browser, &cache);
    runner.journey("metrics", |j| {
        j.step("one", |_| async { Ok(()) });
    });

    let options = RunOptions {
        metrics: true,
        ..RunOptions::default()
    };
    let results = runner.run(options).await;

    let metrics = results["metrics"].steps[0].pagemetrics.as_ref().unwrap();
    assert_eq!(metrics["Nodes"], 42.0);
}

#[tokio::test]
async fn test_navigation_timeout_fails_the_step() {
    let browser = FakeBrowser::new();
    browser.recorder.stall_navigation.store(true, Ordering::SeqCst);
    let cache = TempDir::new().unwrap();
    let runner = runner(&browser, &cache);

    runner.journey("hangs", |j| {
        j.step("visit", |ctx| async move {
            ctx.driver.page.goto("https://slow.test/").await?;
            Ok(())
        });
        j.step("after", |_| async { Ok(()) });
    });

    let mut options = RunOptions::default();
    options.context.navigation_timeout_ms = 50;
    let results = tokio::time::timeout(Duration::from_secs(5), runner.run(options))
        .await
        .expect("navigation timeout not applied");
    let result = &results["hangs"];

    assert_eq!(result.status, Status::Failed);
    assert_eq!(result.steps[0].status, Status::Failed);
    assert_eq!(result.steps[1].status, Status::Skipped);
    assert_eq!(
        result.error.as_ref().unwrap().message,
        "Browser driver error: navigating to \"https://slow.test/\" timed out after 50ms"
    );
    assert_eq!(browser.recorder.contexts_closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_trace_start_skips_stop() {
    let browser = FakeBrowser::new();
    browser.recorder.fail_tracing.store(true, Ordering::SeqCst);
    let cache = TempDir::new().unwrap();
    let runner = runner(&browser, &cache);

    runner.journey("untraced", |j| {
        j.step("one", |_| async { Ok(()) });
        j.step("two", |_| async { Ok(()) });
    });

    let options = RunOptions {
        trace: true,
        ..RunOptions::default()
    };
    let results = tokio::time::timeout(Duration::from_secs(5), runner.run(options))
        .await
        .expect("stop waited for a trace that never started");
    let result = &results["untraced"];

    assert_eq!(result.status, Status::Succeeded);
    assert!(result.steps.iter().all(|s| s.traces.is_none()));
    assert_eq!(browser.recorder.trace_starts.load(Ordering::SeqCst), 0);
    assert_eq!(browser.recorder.trace_ends.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_filmstrips_recorded_per_step() {
    let browser = FakeBrowser::new();
    *browser.trace_events.lock() = vec![
        json!({
            "name": "Screenshot",
            "cat": "disabled-by-default-devtools.screenshot",
            "ph": "O",
            "ts": 2000.0,
            "args": {"snapshot": "c2Vjb25k"}
        }),
        json!({
            "name": "Screenshot",
            "cat": "disabled-by-default-devtools.screenshot",
            "ph": "O",
            "ts": 1000.0,
            "args": {"snapshot": "Zmlyc3Q="}
        }),
        json!({"name": "RunTask", "cat": "toplevel", "ph": "X", "ts": 1500.0}),
    ];
    let cache = TempDir::new().unwrap();
    let runner = runner(&browser, &cache);
    runner.journey("filmstrip", |j| {
        j.step("one", |_| async { Ok(()) });
    });

    let options = RunOptions {
        filmstrips: true,
        ..RunOptions::default()
    };
    let results = runner.run(options).await;

    let step = &results["filmstrip"].steps[0];
    let filmstrips = step.filmstrips.as_ref().unwrap();
    assert_eq!(filmstrips.len(), 2);
    assert_eq!(filmstrips[0].blob, "Zmlyc3Q=");
    assert_eq!(filmstrips[0].mime, "image/jpeg");
    assert!(step.metrics.is_none());

    assert_eq!(browser.recorder.trace_starts.load(Ordering::SeqCst), 1);
    let categories = browser.recorder.categories.lock().clone();
    assert!(categories.contains(&"disabled-by-default-devtools.screenshot".to_string()));
    assert!(!categories.contains(&"loading".to_string()));
}

#[tokio::test]
async fn test_build_monitors_merges_defaults() {
    let browser = FakeBrowser::new();
    let runner = Runner::new(browser);
    runner.journey(JourneyOptions::new("login").tags(["prod"]), |j| {
        j.monitor(MonitorConfig {
            schedule: Some(5),
            ..MonitorConfig::default()
        });
    });
    runner.journey("search", |_| {});

    let mut options = RunOptions::default();
    options.monitor.schedule = Some(10);
    options.monitor.locations = Some(vec!["us_east".to_string()]);

    let monitors = runner.build_monitors(&options).unwrap();
    assert_eq!(monitors.len(), 2);

    let login = &monitors[0];
    assert_eq!(login.id(), Some("login"));
    assert_eq!(login.config.schedule, Some(5));
    assert_eq!(login.config.locations, Some(vec!["us_east".to_string()]));
    assert_eq!(login.config.tags, Some(vec!["prod".to_string()]));

    let search = &monitors[1];
    assert_eq!(search.config.schedule, Some(10));
    assert_eq!(search.filter.as_ref().unwrap().match_pattern, "search");
}

#[tokio::test]
async fn test_build_monitors_rejects_duplicate_ids() {
    let browser = FakeBrowser::new();
    let runner = Runner::new(browser);
    for name in ["first", "second", "third"] {
        let id = if name == "third" { "unique" } else { "shared" };
        runner.journey(JourneyOptions::new(name).id(id), |_| {});
    }

    let mut options = RunOptions::default();
    options.monitor.schedule = Some(10);

    let err = runner.build_monitors(&options).unwrap_err();
    match err {
        SyntheticsError::DuplicateMonitors(ids) => assert_eq!(ids, "shared"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_build_monitors_rejects_invalid_schedule() {
    let browser = FakeBrowser::new();
    let runner = Runner::new(browser);
    runner.journey("hourly-ish", |j| {
        j.monitor(MonitorConfig {
            schedule: Some(7),
            ..MonitorConfig::default()
        });
    });

    let err = runner.build_monitors(&RunOptions::default()).unwrap_err();
    assert!(matches!(err, SyntheticsError::InvalidSchedule { .. }));
    assert!(err.to_string().contains("hourly-ish"));
}

#[tokio::test]
async fn test_build_monitors_filters_journeys() {
    let browser = FakeBrowser::new();
    let runner = Runner::new(browser);
    runner.journey(JourneyOptions::new("a").tags(["smoke"]), |_| {});
    runner.journey(JourneyOptions::new("b").tags(["slow"]), |_| {});

    let mut options = RunOptions::default();
    options.monitor.schedule = Some(3);
    options.tags = Some(vec!["smoke".to_string()]);

    let monitors = runner.build_monitors(&options).unwrap();
    assert_eq!(monitors.len(), 1);
    assert_eq!(monitors[0].id(), Some("a"));
}
