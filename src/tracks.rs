// 🎵 Track Catalog
// Fixed, curated list of tones and soundscapes. Not backed by storage.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Tone,
    Nature,
    Bowl,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackDescriptor {
    pub id: &'static str,
    pub name: &'static str,

    #[serde(rename = "type")]
    pub track_type: TrackType,

    /// Hz, tones only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,

    /// Musical note, bowls only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
}

impl TrackDescriptor {
    const fn tone(id: &'static str, name: &'static str, frequency: f64) -> Self {
        TrackDescriptor {
            id,
            name,
            track_type: TrackType::Tone,
            frequency: Some(frequency),
            note: None,
        }
    }

    const fn nature(id: &'static str, name: &'static str) -> Self {
        TrackDescriptor {
            id,
            name,
            track_type: TrackType::Nature,
            frequency: None,
            note: None,
        }
    }

    const fn bowl(id: &'static str, name: &'static str, note: &'static str) -> Self {
        TrackDescriptor {
            id,
            name,
            track_type: TrackType::Bowl,
            frequency: None,
            note: Some(note),
        }
    }
}

pub static TRACKS: [TrackDescriptor; 6] = [
    TrackDescriptor::tone("tone-432", "432 Hz Pure Tone", 432.0),
    TrackDescriptor::tone("tone-528", "528 Hz Love Frequency", 528.0),
    TrackDescriptor::tone("tone-963", "963 Hz Crown", 963.0),
    TrackDescriptor::nature("nature-rain", "Gentle Rain"),
    TrackDescriptor::nature("nature-forest", "Forest Ambience"),
    TrackDescriptor::bowl("bowl-c4", "Crystal Bowl C4", "C4"),
];

pub fn list_tracks() -> &'static [TrackDescriptor] {
    &TRACKS
}
