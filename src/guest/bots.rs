use crate::config::loader::PARAMS_VERSION;
use crate::config::types::TimeLimits;
use crate::core::isolate::{GuestHost, GuestLoader, GuestProgram};
use crate::core::types::GuestLogLevel;
use crate::protocol::{
    self, Direction, InitialParameters, Message, MoveTo, Point, PresentCircumstances, TargetTile,
    TileType,
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

type GuestResult<T> = std::result::Result<T, String>;

/// Names accepted as program bytes by [`BuiltinLoader`].
pub const BUILTIN_BOTS: &[&str] = &["wait", "random-bounce"];

/// Maps a program (a built-in bot name, UTF-8) to an in-process guest.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinLoader;

impl GuestLoader for BuiltinLoader {
    fn load(&self, program: &[u8], limits: &TimeLimits) -> GuestResult<Box<dyn GuestProgram>> {
        let name = std::str::from_utf8(program)
            .map_err(|_| "program is not a built-in bot name".to_string())?
            .trim();
        log::debug!(
            "Loading built-in bot '{}' (tick kill limit {:?})",
            name,
            limits.tick_kill_time_limit
        );
        match name {
            "wait" => Ok(Box::new(WaitBot)),
            "random-bounce" => Ok(Box::new(RandomBounce::default())),
            other => Err(format!(
                "unknown built-in bot '{}' (expected one of: {})",
                other,
                BUILTIN_BOTS.join(", ")
            )),
        }
    }
}

fn read_params(frame: &[u8]) -> GuestResult<InitialParameters> {
    let messages = protocol::unpack(frame).map_err(|e| e.to_string())?;
    match messages.into_iter().next() {
        Some(Message::InitialParameters(params)) => Ok(params),
        Some(other) => Err(format!("expected InitialParameters, got {}", other.message_type())),
        None => Err("no initial parameters".to_string()),
    }
}

fn read_circumstances(frame: &[u8]) -> GuestResult<PresentCircumstances> {
    let messages = protocol::unpack(frame).map_err(|e| e.to_string())?;
    match messages.into_iter().next() {
        Some(Message::PresentCircumstances(circumstances)) => Ok(circumstances),
        Some(other) => Err(format!("expected PresentCircumstances, got {}", other.message_type())),
        None => Err("no circumstances".to_string()),
    }
}

fn check_version(host: &GuestHost, params: &InitialParameters) -> GuestResult<()> {
    if params.params_version != PARAMS_VERSION {
        let message = format!(
            "Can't parse InitialParameters v{}; only prepared for v{}",
            params.params_version, PARAMS_VERSION
        );
        host.log(GuestLogLevel::Error, message.clone());
        return Err(message);
    }
    Ok(())
}

fn submit(message: Message) -> GuestResult<Vec<u8>> {
    protocol::pack(&[message]).map_err(|e| e.to_string())
}

/// Waits every turn.
#[derive(Debug, Default)]
pub struct WaitBot;

impl GuestProgram for WaitBot {
    fn instantiate(&mut self, host: &GuestHost, _rng_seed: u64, params: &[u8]) -> GuestResult<()> {
        check_version(host, &read_params(params)?)
    }

    fn tick(&mut self, _host: &GuestHost, circumstances: &[u8]) -> GuestResult<Vec<u8>> {
        read_circumstances(circumstances)?;
        submit(Message::Wait)
    }
}

/// Walks in a straight line, picking a new random heading whenever the way
/// ahead is blocked. Closed doors ahead get opened.
#[derive(Debug, Default)]
pub struct RandomBounce {
    rng: Option<ChaCha8Rng>,
    heading: Direction,
    headings: Vec<Direction>,
}

impl RandomBounce {
    fn passable(tile: Option<TileType>) -> bool {
        matches!(tile, Some(TileType::Floor) | Some(TileType::OpenDoor))
    }

    fn choose(&mut self, circumstances: &PresentCircumstances) -> Message {
        let (dx, dy) = self.heading.offset();
        match circumstances.tile_at(dx, dy) {
            tile if Self::passable(tile) => {
                return Message::MoveTo(MoveTo {
                    direction: self.heading,
                    distance: 1,
                })
            }
            Some(TileType::ClosedDoor) => {
                return Message::Open(TargetTile {
                    target: Point::new(dx, dy),
                })
            }
            _ => {}
        }

        let open: Vec<Direction> = self
            .headings
            .iter()
            .copied()
            .filter(|d| {
                let (dx, dy) = d.offset();
                Self::passable(circumstances.tile_at(dx, dy))
            })
            .collect();
        let picked = match self.rng.as_mut() {
            Some(rng) => open.choose(rng).copied(),
            None => open.first().copied(),
        };
        match picked {
            Some(direction) => {
                self.heading = direction;
                Message::MoveTo(MoveTo {
                    direction,
                    distance: 1,
                })
            }
            None => Message::Wait,
        }
    }
}

impl GuestProgram for RandomBounce {
    fn instantiate(&mut self, host: &GuestHost, rng_seed: u64, params: &[u8]) -> GuestResult<()> {
        let params = read_params(params)?;
        check_version(host, &params)?;

        self.headings = Direction::ALL
            .iter()
            .copied()
            .filter(|d| params.diagonal_movement || !d.is_diagonal())
            .collect();
        let mut rng = ChaCha8Rng::seed_from_u64(rng_seed);
        self.heading = self.headings.choose(&mut rng).copied().unwrap_or_default();
        self.rng = Some(rng);
        host.log(
            GuestLogLevel::Debug,
            format!("starting heading {:?}", self.heading),
        );
        Ok(())
    }

    fn tick(&mut self, _host: &GuestHost, circumstances: &[u8]) -> GuestResult<Vec<u8>> {
        let circumstances = read_circumstances(circumstances)?;
        submit(self.choose(&circumstances))
    }
}
