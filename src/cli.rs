use crate::config::loader::CoordinatorConfig;
use crate::config::validator::check_limits;
use crate::core::coordinator::Coordinator;
use crate::core::isolate::ThreadIsolate;
use crate::guest::{BuiltinLoader, BUILTIN_BOTS};
use crate::protocol::{Message, MoveResult, PresentCircumstances, TileType};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a built-in bot in a walled room for a number of turns
    Run {
        /// JSON coordinator config (limits, rng_seed, params)
        #[arg(long)]
        config: PathBuf,
        /// Built-in bot name
        #[arg(long, default_value = "random-bounce")]
        bot: String,
        /// Number of turns to play
        #[arg(long, default_value_t = 20)]
        ticks: u32,
        /// Override the config's RNG seed
        #[arg(long)]
        seed: Option<u64>,
        /// Side length of the square room, walls included
        #[arg(long, default_value_t = 9)]
        room: u8,
        /// Radius of the surroundings reported each turn
        #[arg(long, default_value_t = 2)]
        radius: u8,
        /// Append lifecycle events to this JSON-lines file
        #[arg(long)]
        audit_log: Option<PathBuf>,
    },
    /// Validate a coordinator config file
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
    /// List built-in bots
    Bots,
}

pub fn run() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            bot,
            ticks,
            seed,
            room,
            radius,
            audit_log,
        } => {
            if let Some(path) = audit_log {
                crate::observability::audit::init_audit_log(&path)
                    .with_context(|| format!("opening audit log {}", path.display()))?;
            }
            let mut config = CoordinatorConfig::from_json_file(&config)?;
            if let Some(seed) = seed {
                config.rng_seed = seed;
            }
            if room < 3 {
                bail!("room must be at least 3 tiles wide");
            }

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("building tokio runtime")?;
            runtime.block_on(play(config, bot, ticks, Room::new(room), radius))
        }
        Commands::CheckConfig { config } => {
            let content = std::fs::read_to_string(&config)
                .with_context(|| format!("reading {}", config.display()))?;
            let parsed: CoordinatorConfig =
                serde_json::from_str(&content).context("parsing config JSON")?;
            let result = check_limits(&parsed.limits);
            for warning in &result.warnings {
                eprintln!("warning: {}", warning);
            }
            for error in &result.errors {
                eprintln!("error: {}", error);
            }
            if !result.is_valid() {
                bail!("{} invalid", config.display());
            }
            println!("{} ok", config.display());
            Ok(())
        }
        Commands::Bots => {
            for name in BUILTIN_BOTS {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

async fn play(config: CoordinatorConfig, bot: String, ticks: u32, mut room: Room, radius: u8) -> Result<()> {
    let (isolate, responses) = ThreadIsolate::launch(Arc::new(BuiltinLoader))?;
    let stride = config.params.player_stride;
    let coordinator = Coordinator::spawn(isolate, responses, config)?;
    info!("Starting bot '{}' as module {}", bot, coordinator.module_id());
    coordinator.kickoff(bot.into_bytes())?;
    coordinator
        .until_ready()
        .await
        .context("bot failed to become ready")?;

    let mut last_result = MoveResult::Succeeded;
    for turn in 1..=ticks {
        let circumstances = room.circumstances(last_result, radius);
        let message = match coordinator.tick(circumstances).await {
            Ok(message) => message,
            Err(e) => {
                eprintln!("turn {}: {}", turn, e);
                break;
            }
        };
        last_result = room.apply(&message, stride);

        let snapshot = coordinator.snapshot();
        let line = serde_json::json!({
            "turn": turn,
            "move": message,
            "result": format!("{:?}", last_result),
            "position": [room.x, room.y],
            "tick_ms": snapshot.last_tick_duration_ms,
            "strikes": snapshot.strike_count,
        });
        println!("{}", line);

        if matches!(message, Message::Resign) || snapshot.status.is_terminal() {
            break;
        }
    }

    coordinator.shutdown();
    println!(
        "{}",
        serde_json::to_string_pretty(&coordinator.snapshot()).context("encoding final state")?
    );
    Ok(())
}

/// Square room, walls on the border, door-free.
struct Room {
    size: i16,
    x: i16,
    y: i16,
}

impl Room {
    fn new(size: u8) -> Self {
        let size = i16::from(size);
        Self {
            size,
            x: size / 2,
            y: size / 2,
        }
    }

    fn tile(&self, x: i16, y: i16) -> TileType {
        if x < 0 || y < 0 || x >= self.size || y >= self.size {
            TileType::Void
        } else if x == 0 || y == 0 || x == self.size - 1 || y == self.size - 1 {
            TileType::Wall
        } else {
            TileType::Floor
        }
    }

    fn circumstances(&self, last_move_result: MoveResult, radius: u8) -> PresentCircumstances {
        let r = i16::from(radius);
        let mut surroundings = Vec::new();
        for dy in -r..=r {
            for dx in -r..=r {
                surroundings.push(self.tile(self.x + dx, self.y + dy));
            }
        }
        PresentCircumstances {
            last_tick_duration: 0,
            last_move_result,
            current_hit_points: 100,
            surroundings,
            surroundings_radius: radius,
        }
    }

    fn apply(&mut self, message: &Message, stride: u8) -> MoveResult {
        match message {
            Message::Wait | Message::Resign => MoveResult::Succeeded,
            Message::MoveTo(step) => {
                if step.distance == 0 || step.distance > stride {
                    return MoveResult::Invalid;
                }
                let (dx, dy) = step.direction.offset();
                for _ in 0..step.distance {
                    if self.tile(self.x + dx, self.y + dy) != TileType::Floor {
                        return MoveResult::Failed;
                    }
                    self.x += dx;
                    self.y += dy;
                }
                MoveResult::Succeeded
            }
            // No doors in this room
            Message::Open(_) | Message::Close(_) => MoveResult::Failed,
            _ => MoveResult::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Direction, MoveTo};

    #[test]
    fn test_room_walls_block_moves() {
        let mut room = Room::new(3);
        assert_eq!((room.x, room.y), (1, 1));
        let step = Message::MoveTo(MoveTo {
            direction: Direction::North,
            distance: 1,
        });
        assert_eq!(room.apply(&step, 1), MoveResult::Failed);
        assert_eq!((room.x, room.y), (1, 1));
    }

    #[test]
    fn test_room_stride_limit() {
        let mut room = Room::new(9);
        let far = Message::MoveTo(MoveTo {
            direction: Direction::East,
            distance: 2,
        });
        assert_eq!(room.apply(&far, 1), MoveResult::Invalid);
        assert_eq!(room.apply(&far, 2), MoveResult::Succeeded);
        assert_eq!((room.x, room.y), (6, 4));
        assert_eq!(room.apply(&Message::error("x"), 1), MoveResult::Error);
    }

    #[test]
    fn test_circumstances_square() {
        let room = Room::new(5);
        let c = room.circumstances(MoveResult::Succeeded, 2);
        assert_eq!(c.surroundings.len(), 25);
        assert_eq!(c.tile_at(0, 0), Some(TileType::Floor));
        assert_eq!(c.tile_at(2, 0), Some(TileType::Wall));
        assert_eq!(c.tile_at(-2, -2), Some(TileType::Wall));
    }
}
