//! Scripted client example
//!
//! Connects to a running rusty-realm server, prints everything the server
//! sends, and plays a fixed script: one chat line, a short walk, then the
//! profile, bag and save commands.
//!
//! Usage: `cargo run --example scripted_client -- 127.0.0.1:8999`

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_util::codec::Framed;

use rusty_realm::core::{Message, MessageCodec};
use rusty_realm::protocol::{
    decode_body, encode_body, Broadcast, GameCommand, SyncPid, SyncPlayers, Talk, MSG_BROADCAST,
    MSG_GAME, MSG_MOVE, MSG_SYNC_PID, MSG_SYNC_PLAYERS, MSG_TALK, MSG_VANISH,
};
use rusty_realm::world::Position;

fn describe(message: &Message) -> String {
    let body = &message.payload[..];
    match message.tag {
        MSG_SYNC_PID => match decode_body::<SyncPid>(body) {
            Ok(sync) => format!("you are actor {}", sync.pid),
            Err(e) => format!("bad sync pid: {}", e),
        },
        MSG_BROADCAST => match decode_body::<Broadcast>(body) {
            Ok(b) => format!("broadcast tp={} from {}: {:?}", b.tp, b.pid, b.data),
            Err(e) => format!("bad broadcast: {}", e),
        },
        MSG_VANISH => match decode_body::<SyncPid>(body) {
            Ok(gone) => format!("actor {} left view", gone.pid),
            Err(e) => format!("bad vanish: {}", e),
        },
        MSG_SYNC_PLAYERS => match decode_body::<SyncPlayers>(body) {
            Ok(players) => format!("{} actors around", players.ps.len()),
            Err(e) => format!("bad player sync: {}", e),
        },
        MSG_GAME => match decode_body::<GameCommand>(body) {
            Ok(reply) => format!("game: {}", reply.content),
            Err(e) => format!("bad game reply: {}", e),
        },
        other => format!("tag {} ({} bytes)", other, message.payload_len()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8999".to_string());

    println!("Connecting to {}", addr);
    let stream = TcpStream::connect(&addr).await?;
    let (mut sink, mut source) = Framed::new(stream, MessageCodec::default()).split();

    let printer = tokio::spawn(async move {
        while let Some(frame) = source.next().await {
            match frame {
                Ok(message) => println!("<- {}", describe(&message)),
                Err(e) => {
                    println!("connection error: {}", e);
                    break;
                }
            }
        }
        println!("server closed the connection");
    });

    let talk = Talk { content: "hello from the scripted client".to_string() };
    sink.send(Message::new(MSG_TALK, encode_body(&talk)?)).await?;
    sleep(Duration::from_millis(200)).await;

    for step in 1..=5 {
        let position = Position::new(160.0 + step as f32 * 12.0, 0.0, 150.0, 90.0);
        println!("-> move to ({:.1}, {:.1})", position.x, position.z);
        sink.send(Message::new(MSG_MOVE, encode_body(&position)?)).await?;
        sleep(Duration::from_millis(200)).await;
    }

    for command in ["1", "1 sign scripted", "2 add 1001 3", "2", "8"] {
        println!("-> command {}", command);
        let body = GameCommand { content: command.to_string() };
        sink.send(Message::new(MSG_GAME, encode_body(&body)?)).await?;
        sleep(Duration::from_millis(200)).await;
    }

    sink.close().await?;
    printer.await?;
    Ok(())
}
