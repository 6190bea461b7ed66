use clap::Parser;
use rand::thread_rng;
use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use typing_duel::{
    client::{AttackTarget, CodeMap, GameClient, Jump, Phase},
    common::{resolve_target, ClientConfig, Direction, GameRules, Result},
    logging,
};

const TICK: Duration = Duration::from_millis(16);

#[derive(Clone, Copy, Debug, PartialEq)]
enum Command {
    Move(Direction),
    Teleport(f32, f32),
    Attack(Option<u32>),
    Kill,
    Jump(Jump),
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let command = match words.next()? {
        "k" => Command::Move(Direction::Up),
        "j" => Command::Move(Direction::Down),
        "h" => Command::Move(Direction::Left),
        "l" => Command::Move(Direction::Right),
        "t" => {
            let x = words.next()?.parse().ok()?;
            let y = words.next()?.parse().ok()?;
            Command::Teleport(x, y)
        }
        "a" => match words.next() {
            Some(amount) => Command::Attack(Some(amount.parse().ok()?)),
            None => Command::Attack(None),
        },
        "kill" => Command::Kill,
        "0" => Command::Jump(Jump::LineStart),
        "$" => Command::Jump(Jump::LineEnd),
        "gg" => Command::Jump(Jump::FirstLine),
        "G" => Command::Jump(Jump::LastLine),
        "w" => Command::Jump(Jump::WordForward),
        "e" => Command::Jump(Jump::WordEnd),
        "b" => Command::Jump(Jump::WordBack),
        "q" => Command::Quit,
        other => Command::Jump(Jump::Line(other.strip_suffix('G')?.parse().ok()?)),
    };
    Some(command)
}

fn spawn_stdin_reader() -> Result<Receiver<Command>> {
    let (commands, inbox) = mpsc::channel();
    thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Some(command) => {
                        if commands.send(command).is_err() {
                            break;
                        }
                    }
                    None => warn!("unknown command: {}", line.trim()),
                }
            }
            let _ = commands.send(Command::Quit);
        })?;
    Ok(inbox)
}

fn execute(client: &mut GameClient, command: Command) -> bool {
    let accepted = match command {
        Command::Move(direction) => {
            let moved = client.request_move(direction);
            client.release_move(direction);
            moved
        }
        Command::Teleport(x, y) => client.request_teleport(x, y),
        Command::Attack(amount) => {
            let amount = amount.unwrap_or_else(|| client.rules().roll_damage(&mut thread_rng()));
            client.request_attack(AttackTarget::Opponent, amount)
        }
        Command::Kill => client.request_kill(),
        Command::Jump(jump) => client.request_jump(jump),
        Command::Quit => return false,
    };
    if !accepted {
        debug!(?command, "rejected");
    }
    true
}

fn main() -> Result<()> {
    logging::init();
    let config = ClientConfig::parse();
    let rules = GameRules::default();

    let client = match config.connect.as_deref() {
        Some(target) => {
            let connected = resolve_target(target).and_then(|addr| GameClient::connect(addr, rules));
            match connected {
                Ok(client) => client,
                Err(e) => {
                    error!("Could not connect to {}: {}", target, e);
                    return Ok(());
                }
            }
        }
        None => {
            info!("No server given, starting a practice match");
            GameClient::offline(rules)
        }
    };
    let mut client = match config.map_path() {
        Some(path) => {
            debug!(path = %path.display(), "loading map text");
            client.with_code_map(CodeMap::load(&path)?)
        }
        None => client,
    };

    let commands = spawn_stdin_reader()?;
    let mut last_tick = Instant::now();
    loop {
        match commands.try_recv() {
            Ok(command) => {
                if !execute(&mut client, command) {
                    break;
                }
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break,
        }

        client.pump();
        let now = Instant::now();
        client.update(now.duration_since(last_tick).as_secs_f32() * 1000.0);
        last_tick = now;

        for event in client.drain_events() {
            info!(?event, "game event");
        }
        if let Phase::Ended(outcome) = client.phase() {
            info!(?outcome, kills = client.kills(), "Match finished");
            break;
        }

        thread::sleep(TICK);
    }

    client.disconnect();
    Ok(())
}
