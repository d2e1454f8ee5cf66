use common::util::deserialize_num;
use serde::{Deserialize, Serialize};

/// Payload of a `head` event from the beacon node event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HeadEvent {
    #[serde(deserialize_with = "deserialize_num")]
    pub slot: u64,
    pub block: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_event_from_json() {
        let json = r#"{"slot":"101","block":"0xabcd"}"#;
        let event: HeadEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.slot, 101);
        assert_eq!(event.block, "0xabcd");
    }
}
