use serde::{Deserialize, Serialize};

/// One row of the postal code to station link table.
///
/// `station_id` is the internal [`Station::id`](crate::Station::id) of the
/// nearest station, not its WMO identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PostalStationLink {
    pub plz: String,
    pub station_id: i32,
}
