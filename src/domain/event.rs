/// The event this kiosk checks participants into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInfo {
    pub id: String,
    pub name: String,
    pub banner_url: Option<String>,
}
