#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]

#[tokio::main]
async fn main() {
    roll_watcher::run().await;
}
