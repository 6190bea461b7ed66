use typing_duel::{
    common::{Result, ServerConfig},
    logging,
    server::GameServer,
};

fn main() -> Result<()> {
    logging::init();

    let server = GameServer::bind(&ServerConfig::default())?;
    server.run()
}

// How to run:
// # Terminal 1
// cargo run --bin typing_duel

// # Terminal 2
// cargo run --bin client -- 127.0.0.1

// # Terminal 3
// cargo run --bin client -- 127.0.0.1
