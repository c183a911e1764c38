//! Scripted page-curl session against a simulated renderer.
//!
//! Each script character is one widget gesture:
//!
//! | char | gesture                                         |
//! |------|-------------------------------------------------|
//! | `a`  | curl towards the after side and complete it     |
//! | `b`  | curl towards the before side and complete it    |
//! | `x`  | start an after-side curl, then abandon it       |
//! | `r`  | re-capture the current page                     |
//! | `s`  | swap in new content                             |
//!
//! Whitespace is ignored.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use pagecurl::{
    CommitOutcome, Direction, DocumentRenderer, PagerConfig, ReadingDirection, RefreshToken, Side,
    SimulatedRenderer, SnapshotPager,
};

use crate::commands::config;
use crate::error::CliError;

/// How often the widget polls for a neighbor image.
const NEIGHBOR_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Arguments for `pagecurl simulate`.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Number of pages in the simulated document
    #[arg(long, default_value_t = 10)]
    pub pages: usize,

    /// Page the renderer starts on
    #[arg(long, default_value_t = 0)]
    pub start: usize,

    /// Gesture script (a, b, x, r, s)
    #[arg(long, default_value = "aaab")]
    pub script: String,

    /// INI file with a [pager] section
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Lay pages out right to left
    #[arg(long)]
    pub rtl: bool,

    /// Simulated latency of one renderer step, in milliseconds
    #[arg(long, default_value_t = 5)]
    pub step_latency_ms: u64,

    /// Fail this many render passes right after initialization
    #[arg(long, default_value_t = 0)]
    pub fail_renders: u32,

    /// How long to wait for a neighbor image before flipping anyway, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub neighbor_wait_ms: u64,
}

/// One parsed script step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gesture {
    Flip(Side),
    Abandon(Side),
    Refresh,
    Swap,
}

fn parse_script(script: &str) -> Result<Vec<Gesture>, CliError> {
    script
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c.to_ascii_lowercase() {
            'a' => Ok(Gesture::Flip(Side::After)),
            'b' => Ok(Gesture::Flip(Side::Before)),
            'x' => Ok(Gesture::Abandon(Side::After)),
            'r' => Ok(Gesture::Refresh),
            's' => Ok(Gesture::Swap),
            other => Err(CliError::Config(format!(
                "Unknown gesture '{}' in script. Use a, b, x, r or s.",
                other
            ))),
        })
        .collect()
}

/// Run a scripted session.
pub fn run(args: SimulateArgs) -> Result<(), CliError> {
    if args.pages == 0 {
        return Err(CliError::Config("--pages must be at least 1".to_string()));
    }
    if args.start >= args.pages {
        return Err(CliError::Config(format!(
            "--start {} is past the last page ({})",
            args.start,
            args.pages - 1
        )));
    }

    let gestures = parse_script(&args.script)?;
    let mut pager_config = config::load(args.config.as_deref())?;
    if args.rtl {
        pager_config = pager_config.with_reading_direction(ReadingDirection::RightToLeft);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    runtime.block_on(run_session(&args, pager_config, &gestures))
}

async fn run_session(
    args: &SimulateArgs,
    pager_config: PagerConfig,
    gestures: &[Gesture],
) -> Result<(), CliError> {
    let renderer = Arc::new(
        SimulatedRenderer::at_position(args.pages, args.start)
            .with_step_latency(Duration::from_millis(args.step_latency_ms)),
    );
    let pager = SnapshotPager::new(
        Arc::clone(&renderer) as Arc<dyn DocumentRenderer>,
        pager_config,
    )?;

    if !pager.initialize(RefreshToken::generate()).await {
        return Err(CliError::Simulation(
            "initial capture of the current page failed".to_string(),
        ));
    }
    renderer.fail_next_renders(args.fail_renders);
    println!(
        "Initialized on page {} of {}",
        renderer.position() + 1,
        renderer.page_count()
    );

    let neighbor_wait = Duration::from_millis(args.neighbor_wait_ms);
    for (index, gesture) in gestures.iter().enumerate() {
        let step = index + 1;
        match *gesture {
            Gesture::Flip(side) => {
                let direction = pager.reading_direction().direction_for(side);
                let ready = wait_for_neighbor(&pager, side, neighbor_wait).await;
                pager.notify_pending_transition(direction);
                let outcome = pager.notify_transition_finished(true).await;
                println!(
                    "{:>3}. flip {:<8} neighbor {:<9} -> {:<10} page {}",
                    step,
                    direction.as_str(),
                    if ready { "cached" } else { "missing" },
                    describe_outcome(outcome),
                    renderer.position() + 1
                );
            }
            Gesture::Abandon(side) => {
                let direction = pager.reading_direction().direction_for(side);
                pager.notify_pending_transition(direction);
                let outcome = pager.notify_transition_finished(false).await;
                println!(
                    "{:>3}. abandon {:<5} -> {:<10} page {}",
                    step,
                    direction.as_str(),
                    describe_outcome(outcome),
                    renderer.position() + 1
                );
            }
            Gesture::Refresh => {
                let refreshed = pager.refresh_current().await?;
                println!(
                    "{:>3}. refresh        -> {}",
                    step,
                    if refreshed { "captured" } else { "failed" }
                );
            }
            Gesture::Swap => {
                let swapped = pager.on_content_swap(RefreshToken::generate()).await;
                println!(
                    "{:>3}. swap content   -> {}",
                    step,
                    if swapped { "captured" } else { "failed" }
                );
            }
        }
    }

    // Let in-flight probes and the late refresh finish before reporting.
    tokio::time::sleep(pager.config().late_refresh_delay + neighbor_wait).await;
    let status = pager.status();
    pager.shutdown();

    println!();
    println!("Final page:            {}", renderer.position() + 1);
    println!("Phase:                 {}", status.phase.name());
    println!(
        "Slots:                 backward={} current={} forward={}",
        status.has_backward, status.has_current, status.has_forward
    );
    println!(
        "Navigable:             backward={} forward={}",
        status.flags.can_go(Direction::Backward),
        status.flags.can_go(Direction::Forward)
    );
    println!(
        "Probes:                {} started, {} completed, {} cancelled",
        status.counters.probes_started,
        status.counters.probes_completed,
        status.counters.probes_cancelled
    );
    println!(
        "Commits:               {} completed, {} void",
        status.counters.commits_completed, status.counters.commits_void
    );
    println!(
        "Late refreshes:        {}",
        status.counters.late_refreshes_applied
    );
    println!("Renderer steps:        {}", renderer.steps_taken());
    println!("Render passes:         {}", renderer.render_passes());

    if status.counters.compensation_failures > 0 {
        return Err(CliError::Simulation(format!(
            "{} compensating steps failed; renderer position is unreliable",
            status.counters.compensation_failures
        )));
    }
    Ok(())
}

async fn wait_for_neighbor(pager: &SnapshotPager, side: Side, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if pager.neighbor_for_side(side).is_some() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(NEIGHBOR_POLL_INTERVAL).await;
    }
}

fn describe_outcome(outcome: CommitOutcome) -> &'static str {
    match outcome {
        CommitOutcome::Committed => "committed",
        CommitOutcome::Void => "boundary",
        CommitOutcome::Ignored => "ignored",
        CommitOutcome::NotCompleted => "abandoned",
        CommitOutcome::Superseded => "superseded",
    }
}
