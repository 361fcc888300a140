#[tokio::main]
async fn main() -> anyhow::Result<()> {
    todo_reminders_lib::run().await?;
    Ok(())
}
