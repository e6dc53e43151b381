//! Show timelines.
//!
//! A show file is either a bare list of events or an object with an `events`
//! list and an optional `duration_ms`. Both JSON and YAML are accepted.

use std::collections::HashMap;

use anyhow::{Result, anyhow, bail};
use log::{Level, debug};
use serde::{Deserialize, Serialize};

use crate::log_or_err;
use crate::structs::channel::{Channel, ChannelMap};
use crate::utils::errors::{ConfigError, FormatError};

/// Time after the last event kept when a show does not state its duration.
pub const DEFAULT_TAIL_MS: f64 = 1000.0;

/// A request to set one channel at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(alias = "time")]
    pub time_ms: f64,
    #[serde(default)]
    pub character: String,
    pub movement: String,
    pub state: bool,
}

impl Event {
    pub fn new(time_ms: f64, character: &str, movement: &str, state: bool) -> Self {
        Self {
            time_ms,
            character: character.to_string(),
            movement: movement.to_string(),
            state,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ShowDocument {
    Wrapped {
        events: Vec<Event>,
        #[serde(default)]
        duration_ms: Option<f64>,
    },
    Bare(Vec<Event>),
}

/// Parsed show file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Show {
    pub events: Vec<Event>,
    pub duration_ms: Option<f64>,
}

impl Show {
    pub fn from_json(text: &str) -> Result<Self, FormatError> {
        let document: ShowDocument =
            serde_json::from_str(text).map_err(|e| FormatError::Show(e.to_string()))?;
        Ok(document.into())
    }

    pub fn from_yaml(text: &str) -> Result<Self, FormatError> {
        let document: ShowDocument =
            serde_yaml_ng::from_str(text).map_err(|e| FormatError::Show(e.to_string()))?;
        Ok(document.into())
    }

    /// Parses JSON when the text starts like JSON, YAML otherwise.
    pub fn parse(text: &str) -> Result<Self, FormatError> {
        match text.trim_start().chars().next() {
            Some('{') | Some('[') => Self::from_json(text),
            _ => Self::from_yaml(text),
        }
    }

    /// Stated duration, or the last event plus [`DEFAULT_TAIL_MS`].
    pub fn duration_ms(&self) -> f64 {
        self.duration_ms.unwrap_or_else(|| {
            self.events
                .iter()
                .map(|e| e.time_ms)
                .fold(0.0, f64::max)
                + DEFAULT_TAIL_MS
        })
    }
}

impl From<ShowDocument> for Show {
    fn from(document: ShowDocument) -> Self {
        match document {
            ShowDocument::Wrapped {
                events,
                duration_ms,
            } => Show {
                events,
                duration_ms,
            },
            ShowDocument::Bare(events) => Show {
                events,
                duration_ms: None,
            },
        }
    }
}

/// An event resolved to its channel.
///
/// `seq` is the insertion index and breaks ties between events with equal
/// times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedEvent {
    pub time_ms: f64,
    pub seq: usize,
    pub channel: Channel,
    pub state: bool,
}

/// Events sorted by `(time_ms, seq)`.
#[derive(Debug, Clone)]
pub struct Timeline {
    events: Vec<TimedEvent>,
    skipped: usize,
    redundant: usize,
    fail_level: Level,
}

impl Default for Timeline {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            skipped: 0,
            redundant: 0,
            fail_level: Level::Error,
        }
    }
}

impl Timeline {
    /// Resolves events through `map`.
    ///
    /// Unknown channels are skipped with a warning, or fail when `fail_level`
    /// is `Warn` or lower. Invalid times always fail.
    pub fn resolve(events: &[Event], map: &ChannelMap, fail_level: Level) -> Result<Self> {
        let mut timeline = Timeline {
            fail_level,
            ..Default::default()
        };

        for (seq, event) in events.iter().enumerate() {
            if !event.time_ms.is_finite() || event.time_ms < 0.0 {
                bail!(FormatError::InvalidEventTime {
                    index: seq,
                    time_ms: event.time_ms,
                });
            }

            match map.resolve(&event.character, &event.movement) {
                Some(channel) => timeline.events.push(TimedEvent {
                    time_ms: event.time_ms,
                    seq,
                    channel,
                    state: event.state,
                }),
                None => {
                    timeline.skipped += 1;
                    log_or_err!(
                        timeline,
                        Level::Warn,
                        anyhow!(ConfigError::UnknownChannel {
                            character: event.character.clone(),
                            movement: event.movement.clone(),
                        })
                    );
                }
            }
        }

        timeline.sort();
        Ok(timeline)
    }

    /// Builds a timeline from already resolved `(time_ms, channel, state)`
    /// triples, keeping their order as the tie-break.
    pub fn from_channels<I>(events: I) -> Result<Self>
    where
        I: IntoIterator<Item = (f64, Channel, bool)>,
    {
        let mut timeline = Timeline::default();
        for (seq, (time_ms, channel, state)) in events.into_iter().enumerate() {
            if !time_ms.is_finite() || time_ms < 0.0 {
                bail!(FormatError::InvalidEventTime {
                    index: seq,
                    time_ms,
                });
            }
            timeline.events.push(TimedEvent {
                time_ms,
                seq,
                channel,
                state,
            });
        }
        timeline.sort();
        Ok(timeline)
    }

    fn sort(&mut self) {
        self.events.sort_by(|a, b| {
            a.time_ms
                .total_cmp(&b.time_ms)
                .then_with(|| a.seq.cmp(&b.seq))
        });

        let mut last: HashMap<Channel, bool> = HashMap::new();
        for event in &self.events {
            let previous = last.insert(event.channel, event.state).unwrap_or(false);
            if previous == event.state {
                self.redundant += 1;
                debug!(
                    "{} at {:.1} ms repeats state {}",
                    event.channel, event.time_ms, event.state
                );
            }
        }
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    /// Events dropped because their channel could not be resolved.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Events that did not change their channel's state.
    pub fn redundant(&self) -> usize {
        self.redundant
    }

    pub fn end_ms(&self) -> f64 {
        self.events.last().map_or(0.0, |e| e.time_ms)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::channel::Track;

    #[test]
    fn parses_both_document_shapes() -> anyhow::Result<()> {
        let bare = Show::parse(
            r#"[{"time_ms": 10, "character": "Rolfe", "movement": "mouth", "state": true}]"#,
        )?;
        assert_eq!(bare.events.len(), 1);
        assert_eq!(bare.duration_ms(), 1010.0);

        let wrapped = Show::parse(
            "duration_ms: 5000\nevents:\n  - { time: 0, character: Mitzi, movement: mouth, state: true }\n",
        )?;
        assert_eq!(wrapped.duration_ms(), 5000.0);
        assert_eq!(wrapped.events[0].character, "Mitzi");
        Ok(())
    }

    #[test]
    fn ties_keep_insertion_order() -> anyhow::Result<()> {
        let map = ChannelMap::rae();
        let events = vec![
            Event::new(20.0, "Rolfe", "mouth", false),
            Event::new(10.0, "Rolfe", "mouth", true),
            Event::new(20.0, "Rolfe", "mouth", true),
        ];
        let timeline = Timeline::resolve(&events, &map, Level::Error)?;
        let order: Vec<usize> = timeline.events().iter().map(|e| e.seq).collect();
        assert_eq!(order, [1, 0, 2]);
        assert_eq!(timeline.events()[0].channel, Channel::new(Track::Td, 0));
        Ok(())
    }

    #[test]
    fn unknown_channels_depend_on_fail_level() {
        let map = ChannelMap::rae();
        let events = vec![
            Event::new(0.0, "Rolfe", "mouth", true),
            Event::new(5.0, "Nobody", "wave", true),
        ];

        let lenient = Timeline::resolve(&events, &map, Level::Error);
        assert!(matches!(lenient, Ok(ref t) if t.skipped() == 1 && t.events().len() == 1));

        let strict = Timeline::resolve(&events, &map, Level::Warn);
        let err = strict.err().and_then(|e| e.downcast::<ConfigError>().ok());
        assert!(matches!(err, Some(ConfigError::UnknownChannel { .. })));
    }

    #[test]
    fn negative_times_are_rejected() {
        let map = ChannelMap::rae();
        let events = vec![Event::new(-1.0, "Rolfe", "mouth", true)];
        let err = Timeline::resolve(&events, &map, Level::Error)
            .err()
            .and_then(|e| e.downcast::<FormatError>().ok());
        assert!(matches!(err, Some(FormatError::InvalidEventTime { index: 0, .. })));
    }
}
