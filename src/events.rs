use serde::de::{self, Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;
use tracing::debug;

pub const RESOURCE_WRITE_SUCCESS: &str = "Microsoft.Resources.ResourceWriteSuccess";
pub const RESOURCE_WRITE_FAILURE: &str = "Microsoft.Resources.ResourceWriteFailure";
pub const RESOURCE_WRITE_CANCEL: &str = "Microsoft.Resources.ResourceWriteCancel";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEventType {
    WriteSuccess,
    WriteFailure,
    WriteCancel,
    Other(String),
}

impl From<&str> for ResourceEventType {
    fn from(s: &str) -> Self {
        match s {
            RESOURCE_WRITE_SUCCESS => ResourceEventType::WriteSuccess,
            RESOURCE_WRITE_FAILURE => ResourceEventType::WriteFailure,
            RESOURCE_WRITE_CANCEL => ResourceEventType::WriteCancel,
            other => ResourceEventType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ResourceEventType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResourceEventType::WriteSuccess => f.write_str(RESOURCE_WRITE_SUCCESS),
            ResourceEventType::WriteFailure => f.write_str(RESOURCE_WRITE_FAILURE),
            ResourceEventType::WriteCancel => f.write_str(RESOURCE_WRITE_CANCEL),
            ResourceEventType::Other(other) => f.write_str(other),
        }
    }
}

impl<'de> Deserialize<'de> for ResourceEventType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(ResourceEventType::from(raw.as_str()))
    }
}

/// Payload of a resource write notification. Provider and uri default to empty
/// so foreign events still reach the provider filter.
#[derive(serde::Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEventData {
    #[serde(default)]
    pub resource_provider: String,
    #[serde(default)]
    pub resource_uri: String,
    #[serde(default)]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// One event grid notification. Envelope fields besides `eventType` and `data`
/// are only used for logging.
#[derive(serde::Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    pub event_type: ResourceEventType,
    #[serde(default)]
    pub event_time: Option<String>,
    #[serde(default)]
    pub data: ResourceEventData,
}

/// A batch element that could not be decoded as a resource event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndecodableEvent {
    pub id: Option<String>,
    pub reason: String,
}

/// A single invocation payload: either one event or a batch of them.
/// Batch elements are decoded one by one so a bad element only costs itself.
#[derive(Debug)]
pub enum Delivery {
    Single(ResourceEvent),
    Batch(Vec<Result<ResourceEvent, UndecodableEvent>>),
}

impl Delivery {
    pub fn into_events(self) -> Vec<Result<ResourceEvent, UndecodableEvent>> {
        match self {
            Delivery::Single(event) => vec![Ok(event)],
            Delivery::Batch(events) => events,
        }
    }
}

fn decode_element(raw_value: &Value) -> Result<ResourceEvent, UndecodableEvent> {
    ResourceEvent::deserialize(raw_value).map_err(|e| UndecodableEvent {
        id: raw_value
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string),
        reason: format!("unsupported event: {e}"),
    })
}

impl<'de> Deserialize<'de> for Delivery {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw_value: Value = Deserialize::deserialize(deserializer)?;
        debug!("raw_value: {:?}", raw_value);

        if let Value::Array(elements) = &raw_value {
            tracing::info!("batch of {} events detected", elements.len());
            return Ok(Delivery::Batch(elements.iter().map(decode_element).collect()));
        }

        if let Ok(event) = ResourceEvent::deserialize(&raw_value) {
            tracing::info!("single event detected");
            return Ok(Delivery::Single(event));
        }

        Err(de::Error::custom(format!(
            "unsupported event type: {raw_value}"
        )))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn event_json(event_type: &str) -> String {
        format!(
            r#"{{
                "id": "a1b2",
                "topic": "/subscriptions/0000",
                "subject": "/subscriptions/0000/resourceGroups/rg1/providers/Microsoft.ContainerInstance/containerGroups/cg1",
                "eventType": "{}",
                "eventTime": "2018-11-02T21:46:13.939951Z",
                "data": {{
                    "resourceProvider": "Microsoft.ContainerInstance",
                    "resourceUri": "/subscriptions/0000/resourceGroups/rg1/providers/Microsoft.ContainerInstance/containerGroups/cg1",
                    "operationName": "Microsoft.ContainerInstance/containerGroups/write",
                    "status": "Succeeded"
                }},
                "dataVersion": "",
                "metadataVersion": "1"
            }}"#,
            event_type
        )
    }

    #[test]
    fn test_event_type_from_wire() {
        assert_eq!(
            ResourceEventType::from(RESOURCE_WRITE_SUCCESS),
            ResourceEventType::WriteSuccess
        );
        assert_eq!(
            ResourceEventType::from(RESOURCE_WRITE_CANCEL),
            ResourceEventType::WriteCancel
        );
        let other = ResourceEventType::from("Microsoft.Resources.ResourceDeleteSuccess");
        assert_eq!(
            other,
            ResourceEventType::Other("Microsoft.Resources.ResourceDeleteSuccess".to_string())
        );
        assert_eq!(other.to_string(), "Microsoft.Resources.ResourceDeleteSuccess");
    }

    #[test]
    fn test_single_delivery() {
        let delivery: Delivery = serde_json::from_str(&event_json(RESOURCE_WRITE_FAILURE)).unwrap();
        let events = delivery.into_events();
        assert_eq!(events.len(), 1);
        let event = events[0].as_ref().unwrap();
        assert_eq!(event.event_type, ResourceEventType::WriteFailure);
        assert_eq!(event.id.as_deref(), Some("a1b2"));
        assert_eq!(event.data.resource_provider, "Microsoft.ContainerInstance");
        assert_eq!(event.data.status.as_deref(), Some("Succeeded"));
    }

    #[test]
    fn test_batch_delivery() {
        let payload = format!(
            "[{}, {}]",
            event_json(RESOURCE_WRITE_SUCCESS),
            event_json("Microsoft.Resources.ResourceActionSuccess")
        );
        let delivery: Delivery = serde_json::from_str(&payload).unwrap();
        match delivery {
            Delivery::Batch(events) => {
                assert_eq!(events.len(), 2);
                assert_eq!(
                    events[0].as_ref().unwrap().event_type,
                    ResourceEventType::WriteSuccess
                );
                assert!(matches!(
                    events[1].as_ref().unwrap().event_type,
                    ResourceEventType::Other(_)
                ));
            }
            other => panic!("expected batch, got {:?}", other),
        }
    }

    #[test]
    fn test_batch_tolerates_sparse_foreign_events() {
        let payload = format!(
            r#"[{}, {{"eventType": "Microsoft.Resources.ResourceActionSuccess", "data": {{"resourceProvider": "Microsoft.Storage"}}}}]"#,
            event_json(RESOURCE_WRITE_SUCCESS)
        );
        let events = serde_json::from_str::<Delivery>(&payload)
            .unwrap()
            .into_events();
        assert_eq!(events.len(), 2);
        let foreign = events[1].as_ref().unwrap();
        assert_eq!(foreign.data.resource_provider, "Microsoft.Storage");
        assert_eq!(foreign.data.resource_uri, "");
    }

    #[test]
    fn test_batch_keeps_undecodable_elements() {
        let payload = format!(
            r#"[{}, {{"id": "x9", "data": {{}}}}, 42]"#,
            event_json(RESOURCE_WRITE_CANCEL)
        );
        let events = serde_json::from_str::<Delivery>(&payload)
            .unwrap()
            .into_events();
        assert_eq!(events.len(), 3);
        assert!(events[0].is_ok());
        let missing_type = events[1].as_ref().unwrap_err();
        assert_eq!(missing_type.id.as_deref(), Some("x9"));
        assert!(missing_type.reason.contains("eventType"), "{}", missing_type.reason);
        assert_eq!(events[2].as_ref().unwrap_err().id, None);
    }

    #[test]
    fn test_unsupported_payload() {
        let result = serde_json::from_str::<Delivery>(r#"{"Records": []}"#);
        assert!(result.is_err());
    }
}
