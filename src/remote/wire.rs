//! JSON shapes exchanged with the remote store.
//!
//! A collection is a JSON object mapping each server-assigned reference to the
//! record payload. References are never part of the payload itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{Bike, CountingMethod, Maintenance, UNSAVED_ID};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BikeDoc {
    pub name: String,
    pub counting_method: CountingMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceDoc {
    pub name: String,
    pub value: f64,
    pub date: i64,
    pub is_done: bool,
}

/// Response body of push endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefResponse {
    #[serde(rename = "ref")]
    pub remote_ref: String,
}

/// Response body of `GET /api/me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub user_id: String,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub type BikeCollection = BTreeMap<String, BikeDoc>;
pub type MaintenanceCollection = BTreeMap<String, MaintenanceDoc>;

impl From<&Bike> for BikeDoc {
    fn from(bike: &Bike) -> Self {
        Self {
            name: bike.name.clone(),
            counting_method: bike.counting_method,
        }
    }
}

impl BikeDoc {
    pub fn into_bike(self, remote_ref: String) -> Bike {
        Bike {
            id: UNSAVED_ID,
            remote_ref: Some(remote_ref),
            name: self.name,
            counting_method: self.counting_method,
        }
    }
}

impl From<&Maintenance> for MaintenanceDoc {
    fn from(maintenance: &Maintenance) -> Self {
        Self {
            name: maintenance.name.clone(),
            value: maintenance.value,
            date: maintenance.date,
            is_done: maintenance.is_done,
        }
    }
}

impl MaintenanceDoc {
    pub fn into_maintenance(self, remote_ref: String) -> Maintenance {
        Maintenance {
            id: UNSAVED_ID,
            remote_ref: Some(remote_ref),
            name: self.name,
            value: self.value,
            date: self.date,
            is_done: self.is_done,
            bike_id: UNSAVED_ID,
        }
    }
}

pub fn bikes_from_collection(collection: BikeCollection) -> Vec<Bike> {
    collection
        .into_iter()
        .map(|(remote_ref, doc)| doc.into_bike(remote_ref))
        .collect()
}

pub fn maintenances_from_collection(collection: MaintenanceCollection) -> Vec<Maintenance> {
    collection
        .into_iter()
        .map(|(remote_ref, doc)| doc.into_maintenance(remote_ref))
        .collect()
}
