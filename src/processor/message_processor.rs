use crate::models::message::DeviceMessage;
use crate::processor::session::Session;
use chrono::Utc;
use tracing::{debug, info, warn};

/// Decodes one device message and applies it to the session. Malformed or foreign
/// messages are logged and skipped; only failures while applying an event are returned.
pub async fn process_message(session: &mut Session, payload: &[u8]) -> anyhow::Result<()> {
    let message: DeviceMessage = match serde_json::from_slice(payload) {
        Ok(m) => m,
        Err(e) => {
            warn!("Failed to parse message: {}", e);
            return Ok(());
        }
    };

    let device_id = match message.get_device_id() {
        Some(id) => id.clone(),
        None => {
            warn!("Message missing device_id, skipping");
            return Ok(());
        }
    };

    if device_id != session.device_id() {
        debug!(device_id = %device_id, "Message for another device, skipping");
        return Ok(());
    }

    info!(
        device_id = %device_id,
        uuid = message.uuid.as_deref().unwrap_or("-"),
        "Processing {}",
        message.event.name()
    );

    session.handle(message.event, Utc::now()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::dispatcher::tests::contact;
    use crate::alerts::AlertKind;
    use crate::db::memory::MemoryStore;
    use crate::db::ContactStore;
    use crate::processor::session::tests::session_over;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_garbage_and_foreign_messages_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let (mut session, sink) = session_over(store);

        process_message(&mut session, b"not json").await.unwrap();
        process_message(&mut session, br#"{"type":"panic"}"#).await.unwrap();
        process_message(&mut session, br#"{"type":"panic","device_id":"other"}"#)
            .await
            .unwrap();
        assert!(sink.kinds().is_empty());
    }

    #[tokio::test]
    async fn test_journey_messages_drive_session() {
        let store = Arc::new(MemoryStore::new());
        store.insert_contact(&contact("mother", "+5215512345678", 1)).await.unwrap();
        let (mut session, sink) = session_over(store);

        let start = br#"{"type":"start_journey","device_id":"dev-1","start_lat":"0","start_lng":"0",
            "dest_lat":0,"dest_lng":0.001,"timestamp":"2025-11-29 06:15:15"}"#;
        process_message(&mut session, start).await.unwrap();
        assert!(session.active_journey().is_some());

        let arrive = br#"{"type":"position_fix","DEVICE_ID":"dev-1","LATITUD":"0","LONGITUD":"0.0009",
            "GPS_DATETIME":"2025-11-29 06:20:15"}"#;
        process_message(&mut session, arrive).await.unwrap();
        assert!(session.active_journey().is_none());
        assert_eq!(
            sink.kinds(),
            vec![AlertKind::JourneyStarted, AlertKind::JourneyCompleted]
        );
    }

    #[tokio::test]
    async fn test_session_errors_are_returned() {
        let store = Arc::new(MemoryStore::new());
        let (mut session, _sink) = session_over(store);
        let stop = br#"{"type":"stop_journey","device_id":"dev-1"}"#;
        assert!(process_message(&mut session, stop).await.is_err());
    }

    #[tokio::test]
    async fn test_contact_messages_manage_recipients() {
        let store = Arc::new(MemoryStore::new());
        let (mut session, sink) = session_over(store.clone());

        let add = br#"{"type":"add_contact","device_id":"dev-1","name":"Mother",
            "phone_number":"+52 55 1234 5678","priority":1}"#;
        process_message(&mut session, add).await.unwrap();
        let bad = br#"{"type":"add_contact","device_id":"dev-1","name":"Typo","phone_number":"555-12"}"#;
        assert!(process_message(&mut session, bad).await.is_err());

        let contacts = store.sms_contacts().await.unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].phone_number, "+525512345678");

        let start = br#"{"type":"start_journey","device_id":"dev-1","start_lat":0,"start_lng":0,
            "dest_lat":0,"dest_lng":0.1}"#;
        process_message(&mut session, start).await.unwrap();
        assert_eq!(sink.kinds(), vec![AlertKind::JourneyStarted]);

        let deactivate = format!(
            r#"{{"type":"deactivate_contact","device_id":"dev-1","contact_id":{}}}"#,
            contacts[0].contact_id
        );
        process_message(&mut session, deactivate.as_bytes()).await.unwrap();
        process_message(&mut session, br#"{"type":"stop_journey","device_id":"dev-1","reason":"completed"}"#)
            .await
            .unwrap();
        // nobody left to tell
        assert_eq!(sink.kinds(), vec![AlertKind::JourneyStarted]);
    }
}
