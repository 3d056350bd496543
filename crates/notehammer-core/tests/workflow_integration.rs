//! Export workflow: stage fallbacks, retries and unwinding.

mod common;

use common::{device, run_config, FakeKindle, FakeOptions, Screen};

use notehammer_core::config::RunConfig;
use notehammer_core::device::Device;
use notehammer_core::element::Point;
use notehammer_core::enumerator::{Enumerator, Item};
use notehammer_core::navigator::Navigator;
use notehammer_core::workflow::{Confirmation, ExportStage, ExportWorkflow, ItemOutcome};

async fn first_item(device: &Device, config: &RunConfig) -> Item {
    Navigator::new(device, config).reach_collection().await.unwrap();
    let items = Enumerator::new(device, config).enumerate().await.unwrap();
    items.into_iter().next().unwrap()
}

fn at_collection(screen: &Screen) -> bool {
    matches!(screen, Screen::Collection { name, .. } if name == "To Export")
}

#[tokio::test(start_paused = true)]
async fn exports_and_returns_to_collection() {
    let fake = FakeKindle::new(FakeOptions::default());
    let config = run_config("To Export");
    let device = device(&fake, &config);
    let item = first_item(&device, &config).await;

    let outcome = ExportWorkflow::new(&device, &config).run_with_retry(&item).await.unwrap();

    assert_eq!(
        outcome,
        ItemOutcome::Exported {
            attempts: 1,
            confirmation: Confirmation::Observed,
            lost_position: false
        }
    );
    assert_eq!(fake.uploads(), vec!["Book A"]);
    assert!(at_collection(&fake.screen()));
}

#[tokio::test(start_paused = true)]
async fn retry_count_bounds_attempts() {
    let fake = FakeKindle::new(FakeOptions::default().failing("Book A"));
    let mut config = run_config("To Export");
    config.retry_attempts = 2;
    let device = device(&fake, &config);
    let item = first_item(&device, &config).await;

    let outcome = ExportWorkflow::new(&device, &config).run_with_retry(&item).await.unwrap();

    match outcome {
        ItemOutcome::Failed {
            attempts,
            failure,
            lost_position,
        } => {
            assert_eq!(attempts, 2);
            assert_eq!(failure.stage, ExportStage::AnnotationsView);
            assert!(!lost_position);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(fake.opens("Book A"), 2);
    assert!(fake.uploads().is_empty());
    assert!(at_collection(&fake.screen()));
}

#[tokio::test(start_paused = true)]
async fn zero_retries_still_attempts_once() {
    let fake = FakeKindle::new(FakeOptions::default().failing("Book A"));
    let mut config = run_config("To Export");
    config.retry_attempts = 0;
    let device = device(&fake, &config);
    let item = first_item(&device, &config).await;

    let outcome = ExportWorkflow::new(&device, &config).run_with_retry(&item).await.unwrap();

    assert_eq!(outcome.attempts(), 1);
    assert_eq!(fake.opens("Book A"), 1);
}

#[tokio::test(start_paused = true)]
async fn toolbar_position_fallback_finds_unlabelled_notebook() {
    let mut opts = FakeOptions::default();
    opts.icon_only_notebook = true;
    let fake = FakeKindle::new(opts);
    let config = run_config("To Export");
    let device = device(&fake, &config);
    let item = first_item(&device, &config).await;

    let outcome = ExportWorkflow::new(&device, &config).run_with_retry(&item).await.unwrap();

    assert!(matches!(outcome, ItemOutcome::Exported { attempts: 1, .. }));
    assert_eq!(fake.uploads(), vec!["Book A"]);
}

#[tokio::test(start_paused = true)]
async fn format_prompt_is_optional() {
    let mut opts = FakeOptions::default();
    opts.format_prompt = false;
    let fake = FakeKindle::new(opts);
    let config = run_config("To Export");
    let device = device(&fake, &config);
    let item = first_item(&device, &config).await;

    let outcome = ExportWorkflow::new(&device, &config).run_with_retry(&item).await.unwrap();

    assert!(matches!(outcome, ItemOutcome::Exported { .. }));
    assert_eq!(fake.uploads(), vec!["Book A"]);
}

#[tokio::test(start_paused = true)]
async fn share_sheet_is_scrolled_to_destination() {
    let mut opts = FakeOptions::default();
    opts.destination_after_scrolls = 2;
    let fake = FakeKindle::new(opts);
    let config = run_config("To Export");
    let device = device(&fake, &config);
    let item = first_item(&device, &config).await;
    let swipes_before = fake.swipes().len();

    let outcome = ExportWorkflow::new(&device, &config).run_with_retry(&item).await.unwrap();

    assert!(matches!(outcome, ItemOutcome::Exported { .. }));
    let share_swipes = &fake.swipes()[swipes_before..];
    assert_eq!(share_swipes.len(), 2);
    assert!(share_swipes.iter().all(|(from, to)| from.y == to.y && from.x > to.x));
}

#[tokio::test(start_paused = true)]
async fn destination_missing_after_scrolls_fails_step() {
    let mut opts = FakeOptions::default();
    opts.destination_after_scrolls = 10;
    let fake = FakeKindle::new(opts);
    let mut config = run_config("To Export");
    config.retry_attempts = 1;
    let device = device(&fake, &config);
    let item = first_item(&device, &config).await;

    let outcome = ExportWorkflow::new(&device, &config).run_with_retry(&item).await.unwrap();

    match outcome {
        ItemOutcome::Failed { failure, lost_position, .. } => {
            assert_eq!(failure.stage, ExportStage::DestinationChosen);
            assert!(failure.visible.contains(&"Gmail".to_string()));
            assert!(!lost_position);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(at_collection(&fake.screen()));
}

#[tokio::test(start_paused = true)]
async fn missing_confirm_is_assumed_by_default() {
    let mut opts = FakeOptions::default();
    opts.confirm_button = false;
    let fake = FakeKindle::new(opts);
    let config = run_config("To Export");
    let device = device(&fake, &config);
    let item = first_item(&device, &config).await;

    let outcome = ExportWorkflow::new(&device, &config).run_with_retry(&item).await.unwrap();

    assert!(matches!(
        outcome,
        ItemOutcome::Exported {
            confirmation: Confirmation::Assumed,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn missing_confirm_fails_when_not_assumed() {
    let mut opts = FakeOptions::default();
    opts.confirm_button = false;
    let fake = FakeKindle::new(opts);
    let mut config = run_config("To Export");
    config.retry_attempts = 1;
    config.ui.assume_upload_confirmed = false;
    let device = device(&fake, &config);
    let item = first_item(&device, &config).await;

    let outcome = ExportWorkflow::new(&device, &config).run_with_retry(&item).await.unwrap();

    match outcome {
        ItemOutcome::Failed { failure, .. } => assert_eq!(failure.stage, ExportStage::UploadConfirmed),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn unwind_out_of_reach_renavigates_between_attempts() {
    let mut opts = FakeOptions::default();
    opts.destination_after_scrolls = 10;
    let fake = FakeKindle::new(opts);
    let mut config = run_config("To Export");
    config.retry_attempts = 3;
    config.limits.share_sheet_scrolls = 1;
    // Share sheet -> annotations only; the collection is three presses away.
    config.limits.unwind_back_presses = 1;
    let device = device(&fake, &config);
    let item = first_item(&device, &config).await;

    let outcome = ExportWorkflow::new(&device, &config).run_with_retry(&item).await.unwrap();

    assert!(matches!(
        outcome,
        ItemOutcome::Failed {
            attempts: 3,
            lost_position: true,
            ..
        }
    ));
    assert_eq!(fake.opens("Book A"), 3);
    // Once to find the item, then before the second and third attempts.
    assert_eq!(fake.library_taps(), 3);
}

#[tokio::test(start_paused = true)]
async fn renavigation_recovers_a_lost_item() {
    let mut opts = FakeOptions::default();
    opts.ignored_notebook_taps = 1;
    let fake = FakeKindle::new(opts);
    let mut config = run_config("To Export");
    config.retry_attempts = 2;
    // Unwinding never presses back, so the reader is left open.
    config.limits.unwind_back_presses = 0;
    let device = device(&fake, &config);
    let item = first_item(&device, &config).await;

    let outcome = ExportWorkflow::new(&device, &config).run_with_retry(&item).await.unwrap();

    assert!(matches!(
        outcome,
        ItemOutcome::Exported {
            attempts: 2,
            lost_position: false,
            ..
        }
    ));
    assert_eq!(fake.uploads(), vec!["Book A"]);
    assert_eq!(fake.opens("Book A"), 2);
    assert_eq!(fake.library_taps(), 2);
    assert!(at_collection(&fake.screen()));
}

#[tokio::test(start_paused = true)]
async fn failed_renavigation_stops_retrying() {
    let mut opts = FakeOptions::default();
    opts.destination_after_scrolls = 10;
    let fake = FakeKindle::new(opts);
    let mut config = run_config("To Export");
    config.retry_attempts = 3;
    config.limits.share_sheet_scrolls = 1;
    config.limits.unwind_back_presses = 1;
    // Home recovery gives up at once, so the library tab is never visible.
    config.limits.home_attempts = 0;
    let device = device(&fake, &config);
    let item = first_item(&device, &config).await;

    let outcome = ExportWorkflow::new(&device, &config).run_with_retry(&item).await.unwrap();

    assert!(matches!(
        outcome,
        ItemOutcome::Failed {
            attempts: 1,
            lost_position: true,
            ..
        }
    ));
    assert_eq!(fake.opens("Book A"), 1);
}

#[tokio::test(start_paused = true)]
async fn confirm_button_appearing_after_the_wait_is_tapped() {
    let mut opts = FakeOptions::default();
    opts.confirm_after_snapshots = 1;
    let fake = FakeKindle::new(opts);
    let mut config = run_config("To Export");
    // The wait takes exactly one snapshot; the button shows in the next one.
    config.export_delay = std::time::Duration::ZERO;
    let device = device(&fake, &config);
    let item = first_item(&device, &config).await;

    let outcome = ExportWorkflow::new(&device, &config).run_with_retry(&item).await.unwrap();

    assert!(matches!(
        outcome,
        ItemOutcome::Exported {
            attempts: 1,
            confirmation: Confirmation::Observed,
            ..
        }
    ));
    assert_eq!(fake.uploads(), vec!["Book A"]);
}

#[tokio::test(start_paused = true)]
async fn unlabelled_export_icon_is_found_by_fixed_points() {
    let mut opts = FakeOptions::default();
    opts.icon_only_export = true;
    let fake = FakeKindle::new(opts);
    let config = run_config("To Export");
    let device = device(&fake, &config);
    let item = first_item(&device, &config).await;

    let outcome = ExportWorkflow::new(&device, &config).run_with_retry(&item).await.unwrap();

    assert!(matches!(outcome, ItemOutcome::Exported { attempts: 1, .. }));
    assert_eq!(fake.uploads(), vec!["Book A"]);
    let taps = fake.taps();
    let first = taps.iter().position(|p| *p == Point::new(980, 160)).unwrap();
    let second = taps.iter().position(|p| *p == Point::new(860, 160)).unwrap();
    assert!(first < second);
}

#[tokio::test(start_paused = true)]
async fn stale_location_is_relocated_by_title() {
    let fake = FakeKindle::new(FakeOptions::default());
    let config = run_config("To Export");
    let device = device(&fake, &config);
    let item = first_item(&device, &config).await;
    let stale = Item::new(item.title.clone(), notehammer_core::element::Point::new(1, 1));

    let outcome = ExportWorkflow::new(&device, &config).run_with_retry(&stale).await.unwrap();

    assert!(matches!(outcome, ItemOutcome::Exported { .. }));
    assert_eq!(fake.opens("Book A"), 1);
}
