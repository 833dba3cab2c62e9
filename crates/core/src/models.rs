use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripData {
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub budget: String,
    #[serde(default)]
    pub preference: String,
}

impl TripData {
    pub fn is_empty(&self) -> bool {
        self.destination.trim().is_empty()
            && self.date.trim().is_empty()
            && self.budget.trim().is_empty()
            && self.preference.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

/// Body of a planning request as sent by the web client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub trip_data: Option<TripData>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub url: String,
    pub small_url: String,
    pub full_url: String,
    pub author: String,
    pub description: String,
}

/// Side-panel facts about the destination. Everything but the name comes from
/// optional third-party lookups and is omitted when they are off or fail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationInfo {
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usd_exchange_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub answer: String,
    pub photos: Vec<Photo>,
    pub destination_info: Option<DestinationInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_request_accepts_camel_case_body() {
        let request: PlanRequest = serde_json::from_str(
            r#"{
                "question": "¿Qué hacer en Lisboa?",
                "tripData": { "destination": "Lisboa", "date": "2031-05-01" },
                "history": [{ "question": "hola", "answer": "..." }],
                "userId": "u-1"
            }"#,
        )
        .unwrap();

        let trip = request.trip_data.unwrap();
        assert_eq!(trip.destination, "Lisboa");
        assert!(trip.budget.is_empty());
        assert_eq!(request.history.len(), 1);
        assert_eq!(request.user_id.as_deref(), Some("u-1"));
    }

    #[test]
    fn plan_response_serializes_destination_info_key() {
        let response = PlanResponse {
            answer: "ok".to_string(),
            photos: Vec::new(),
            destination_info: None,
        };
        let value = serde_json::to_value(response).unwrap();
        assert!(value.get("destinationInfo").is_some());
    }
}
