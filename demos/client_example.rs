//! packetlog Client Example

use packetlog::client::PacketClient;
use tokio::time::{sleep, Duration};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Starting packetlog Client Example");

    let address = "127.0.0.1:9000";

    match PacketClient::connect(address).await {
        Ok(mut client) => {
            println!("Connected to packetlog server");

            for i in 1..=3 {
                let reply = client.send_line(format!("example packet {}", i)).await?;
                println!("Journal after packet {}:", i);
                print!("{}", String::from_utf8_lossy(&reply));
                sleep(Duration::from_millis(500)).await;
            }

            client.close().await?;
            println!("Client connection closed");
        }
        Err(e) => {
            eprintln!("Failed to connect: {}", e);
            eprintln!("Make sure the server is running");
        }
    }

    Ok(())
}
