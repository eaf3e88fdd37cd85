//! End-to-end runs of the built-in bots on real guest threads
//!
//! These use the wall clock: the guest thread makes progress outside the
//! runtime, so a paused clock would race the setup deadline.

use botbox::config::types::{CoordinatorError, ModuleStatus, TimeLimits};
use botbox::guest::BuiltinLoader;
use botbox::protocol::{Message, MoveResult, PresentCircumstances, TileType};
use botbox::{Coordinator, CoordinatorConfig, ThreadIsolate};
use std::sync::Arc;
use std::time::Duration;

fn config() -> CoordinatorConfig {
    CoordinatorConfig::new(
        TimeLimits {
            setup_time_limit: Duration::from_secs(2),
            tick_warn_time_limit: Duration::from_millis(500),
            tick_kill_time_limit: Duration::from_secs(2),
            minimum_tick_time: Duration::ZERO,
            max_strikes: 3,
        },
        99,
    )
}

fn open_floor() -> PresentCircumstances {
    let mut surroundings = vec![TileType::Floor; 25];
    surroundings[0] = TileType::Wall;
    PresentCircumstances {
        last_tick_duration: 0,
        last_move_result: MoveResult::Succeeded,
        current_hit_points: 50,
        surroundings,
        surroundings_radius: 2,
    }
}

fn start(bot: &str, config: CoordinatorConfig) -> Coordinator {
    let (isolate, responses) = ThreadIsolate::launch(Arc::new(BuiltinLoader)).unwrap();
    let coordinator = Coordinator::spawn(isolate, responses, config).unwrap();
    coordinator.kickoff(bot.as_bytes().to_vec()).unwrap();
    coordinator
}

#[tokio::test]
async fn test_wait_bot_waits() {
    let coordinator = start("wait", config());
    coordinator.until_ready().await.unwrap();

    for _ in 0..3 {
        assert_eq!(coordinator.tick(open_floor()).await, Ok(Message::Wait));
    }
    assert_eq!(coordinator.status(), ModuleStatus::Ready);
    assert_eq!(coordinator.snapshot().strike_count, 0);
}

#[tokio::test]
async fn test_random_bounce_moves() {
    let coordinator = start("random-bounce", config());
    coordinator.until_ready().await.unwrap();

    for _ in 0..10 {
        match coordinator.tick(open_floor()).await {
            Ok(Message::MoveTo(step)) => assert_eq!(step.distance, 1),
            other => panic!("expected a move, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_unknown_bot_is_invalid() {
    let coordinator = start("chess", config());
    match coordinator.until_ready().await {
        Err(CoordinatorError::InitFailure(reason)) => {
            assert!(reason.contains("unknown built-in bot"), "{}", reason)
        }
        other => panic!("expected init failure, got {:?}", other),
    }
    assert_eq!(coordinator.status(), ModuleStatus::Invalid);
}

#[tokio::test]
async fn test_parameter_version_mismatch_is_invalid() {
    let mut config = config();
    config.params.params_version = 6;
    let coordinator = start("wait", config);

    assert!(matches!(
        coordinator.until_ready().await,
        Err(CoordinatorError::InitFailure(_))
    ));
    assert_eq!(coordinator.status(), ModuleStatus::Invalid);
}

#[tokio::test]
async fn test_shutdown_stops_bot() {
    let coordinator = start("wait", config());
    coordinator.until_ready().await.unwrap();
    coordinator.shutdown();

    assert_eq!(
        coordinator.tick(open_floor()).await,
        Err(CoordinatorError::ModuleShutdown)
    );
    assert_eq!(coordinator.status(), ModuleStatus::Shutdown);
}
