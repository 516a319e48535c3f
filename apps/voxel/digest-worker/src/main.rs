//! Saved-search digest worker - entry point
//!
//! Drains the saved-search email queue on a schedule.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    voxel_digest_worker::run().await
}
