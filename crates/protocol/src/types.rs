use serde::{Deserialize, Serialize};

/// Milliseconds on the host clock (`performance.now()` in a browser).
pub type Millis = u64;

/// Opaque handle for a DOM element issued by the host's element registry.
///
/// The engine never holds element memory; once the host unregisters an
/// element the handle simply stops matching anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub u64);

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "element#{}", self.0)
    }
}

/// Handle for a one-shot or repeating host timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerId(pub u64);

/// Handle for a requested animation frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(pub u64);

/// One intersection observer notification for a single element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntersectionEntry {
    pub element: ElementId,
    /// Fraction of the element's area inside the viewport, `0.0..=1.0`.
    pub ratio: f64,
    pub is_intersecting: bool,
}

impl IntersectionEntry {
    pub fn new(element: ElementId, ratio: f64) -> Self {
        Self {
            element,
            ratio,
            is_intersecting: ratio > 0.0,
        }
    }
}

/// Vertical layout edges sampled on mount and on every scroll event.
///
/// Both values are viewport-relative pixels (`getBoundingClientRect`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutMeasurement {
    pub container_bottom: f64,
    /// Top edge of the page footer landmark, if the page has one.
    pub footer_top: Option<f64>,
}

impl LayoutMeasurement {
    pub fn new(container_bottom: f64, footer_top: Option<f64>) -> Self {
        Self {
            container_bottom,
            footer_top,
        }
    }
}

/// A single rotating banner. Sequence order is display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerItem {
    pub id: String,
    pub image_url: String,
    pub alt_text: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Identifier of an ad unit with the configured network.
///
/// Only constructed from non-blank configuration, so holding one means the
/// placement is allowed to render.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AdUnitId(String);

impl AdUnitId {
    /// Returns `None` for a missing or blank identifier (fail closed).
    pub fn from_config(raw: Option<&str>) -> Option<Self> {
        let trimmed = raw?.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AdUnitId {
    type Error = &'static str;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::from_config(Some(&raw)).ok_or("ad unit id must not be blank")
    }
}

impl From<AdUnitId> for String {
    fn from(id: AdUnitId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ad_unit_json_is_checked_like_config() {
        assert!(serde_json::from_str::<AdUnitId>(r#""   ""#).is_err());
        let id: AdUnitId = serde_json::from_str(r#"" 2416950 ""#).unwrap();
        assert_eq!(id.as_str(), "2416950");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""2416950""#);
    }

    #[test]
    fn blank_ad_unit_fails_closed() {
        assert_eq!(AdUnitId::from_config(None), None);
        assert_eq!(AdUnitId::from_config(Some("   ")), None);
        assert_eq!(
            AdUnitId::from_config(Some(" 2416950 ")).map(|id| id.as_str().to_owned()),
            Some("2416950".to_owned())
        );
    }

    #[test]
    fn banner_item_uses_camel_case() {
        let json = r#"{"id":"b1","imageUrl":"/a.png","altText":"A","link":"https://x"}"#;
        let item: BannerItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.image_url, "/a.png");
        assert_eq!(item.title, None);

        let back = serde_json::to_string(&item).unwrap();
        assert_eq!(back, json);
    }

    #[test]
    fn intersection_entry_derives_intersecting() {
        assert!(IntersectionEntry::new(ElementId(1), 0.1).is_intersecting);
        assert!(!IntersectionEntry::new(ElementId(1), 0.0).is_intersecting);
    }
}
