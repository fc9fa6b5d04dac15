//! Read-only inspection of the fallback store.

use anyhow::bail;
use fallback_store::{FallbackStore, SqliteStore};
use stampede_core::{Message, Paths};

/// Print the id of every archived message.
pub async fn list_archive(paths: &Paths) -> anyhow::Result<()> {
    let store = SqliteStore::open(&paths.store_file()).await?;
    let entries = archived_messages(&store).await;
    store.close().await?;

    for msg in entries? {
        println!("{}\t{}ms", msg.id, msg.period);
    }
    Ok(())
}

/// Print one archived message as JSON.
pub async fn show_archived(paths: &Paths, id: &str) -> anyhow::Result<()> {
    let store = SqliteStore::open(&paths.store_file()).await?;
    let value = store.get(id).await;
    store.close().await?;

    let Some(value) = value? else {
        bail!("No archived message with id {id}");
    };
    let msg: Message = serde_json::from_slice(&value)?;
    println!("{}", serde_json::to_string_pretty(&msg)?);
    Ok(())
}

/// Decode every entry of the store, in key order.
async fn archived_messages(store: &dyn FallbackStore) -> anyhow::Result<Vec<Message>> {
    let mut messages = Vec::new();
    for key in store.keys().await? {
        if let Some(value) = store.get(&key).await? {
            messages.push(serde_json::from_slice(&value)?);
        }
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn archived_messages_are_decoded_in_key_order() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        paths.ensure_dirs().unwrap();

        let store = SqliteStore::open(&paths.store_file()).await.unwrap();
        for msg in [Message::new("b", 20), Message::new("a", 10)] {
            store
                .put(&msg.id, msg.to_json().unwrap().into_bytes())
                .await
                .unwrap();
        }

        let messages = archived_messages(&store).await.unwrap();
        assert_eq!(messages, vec![Message::new("a", 10), Message::new("b", 20)]);
        store.close().await.unwrap();

        list_archive(&paths).await.unwrap();
        show_archived(&paths, "a").await.unwrap();
        assert!(show_archived(&paths, "missing").await.is_err());
    }
}
