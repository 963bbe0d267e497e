//! Score export: Standard MIDI Files plus optional MuseScore conversion.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use tracing::{info, warn};

use crate::errors::RenderError;
use crate::instruments;
use crate::plan::GlobalParameters;
use crate::score::Part;

const TICKS_PER_QUARTER: u16 = 480;
const VELOCITY: u8 = 80;
const PERCUSSION_CHANNEL: u8 = 9;
const MAX_DELTA: u32 = 0x0FFF_FFFF;

/// Sound assigned to one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timbre {
    pub name: &'static str,
    pub program: u8,
    pub percussion: bool,
}

/// Everything a renderer needs: the parts, their sounds and the meter.
pub struct RenderRequest<'a> {
    pub parts: &'a BTreeMap<String, Part>,
    pub timbres: BTreeMap<String, Timbre>,
    pub tempo: u32,
    pub time_signature: (u8, u8),
}

impl<'a> RenderRequest<'a> {
    /// Timbres come from each part's instrument profile.
    pub fn new(parts: &'a BTreeMap<String, Part>, params: &GlobalParameters) -> Self {
        let timbres = parts
            .keys()
            .filter_map(|id| {
                instruments::lookup(id).map(|profile| {
                    (
                        id.clone(),
                        Timbre {
                            name: profile.display_name,
                            program: profile.gm_program,
                            percussion: profile.is_percussion(),
                        },
                    )
                })
            })
            .collect();
        Self {
            parts,
            timbres,
            tempo: params.tempo,
            time_signature: params.time_signature_parts().unwrap_or((4, 4)),
        }
    }
}

pub trait Renderer: Send + Sync {
    /// Write the score next to `dest` (a path without extension) and return
    /// every file produced.
    fn render(&self, request: &RenderRequest<'_>, dest: &Path) -> Result<Vec<PathBuf>, RenderError>;

    /// Cheaper render for intermediate revisions.
    fn render_preview(
        &self,
        request: &RenderRequest<'_>,
        dest: &Path,
    ) -> Result<Vec<PathBuf>, RenderError> {
        self.render(request, dest)
    }
}

/// Writes `<dest>.mid`, then converts it with MuseScore for each configured
/// export format.
#[derive(Debug, Clone, Default)]
pub struct MidiRenderer {
    musescore: Option<String>,
    export_formats: Vec<String>,
}

impl MidiRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_musescore(mut self, command: impl Into<String>, formats: Vec<String>) -> Self {
        self.musescore = Some(command.into());
        self.export_formats = formats;
        self
    }

    fn convert(&self, musescore: &str, midi: &Path, format: &str) -> Result<PathBuf, RenderError> {
        let out = midi.with_extension(format);
        let output = Command::new(musescore)
            .arg("-o")
            .arg(&out)
            .arg(midi)
            .output()
            .map_err(|e| RenderError::Conversion {
                format: format.to_string(),
                detail: format!("failed to run {}: {}", musescore, e),
            })?;
        if !output.status.success() {
            return Err(RenderError::Conversion {
                format: format.to_string(),
                detail: format!(
                    "{} exited with code {}: {}",
                    musescore,
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(out)
    }
}

impl MidiRenderer {
    fn write_midi(&self, request: &RenderRequest<'_>, dest: &Path) -> Result<PathBuf, RenderError> {
        let midi_path = dest.with_extension("mid");
        if let Some(parent) = midi_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| RenderError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let smf = score_to_smf(request);
        let mut buf = Vec::new();
        smf.write(&mut buf)
            .map_err(|e| RenderError::Encode(e.to_string()))?;
        std::fs::write(&midi_path, &buf).map_err(|source| RenderError::Io {
            path: midi_path.clone(),
            source,
        })?;
        info!(path = %midi_path.display(), "MIDI written");
        Ok(midi_path)
    }
}

impl Renderer for MidiRenderer {
    fn render(&self, request: &RenderRequest<'_>, dest: &Path) -> Result<Vec<PathBuf>, RenderError> {
        let midi_path = self.write_midi(request, dest)?;
        let mut artifacts = vec![midi_path.clone()];
        if let Some(musescore) = &self.musescore {
            for format in &self.export_formats {
                match self.convert(musescore, &midi_path, format) {
                    Ok(path) => {
                        info!(path = %path.display(), "converted with MuseScore");
                        artifacts.push(path);
                    }
                    Err(err) => warn!("{}", err),
                }
            }
        }
        Ok(artifacts)
    }

    /// MIDI only; MuseScore conversion is reserved for the final score.
    fn render_preview(
        &self,
        request: &RenderRequest<'_>,
        dest: &Path,
    ) -> Result<Vec<PathBuf>, RenderError> {
        Ok(vec![self.write_midi(request, dest)?])
    }
}

fn ticks(duration: f64) -> u32 {
    let raw = (duration * f64::from(TICKS_PER_QUARTER)).round();
    (raw.clamp(1.0, f64::from(MAX_DELTA))) as u32
}

fn midi_key(number: i32) -> u7 {
    u7::new(number.clamp(0, 127) as u8)
}

fn midi_event(delta: u32, channel: u4, message: MidiMessage) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta.min(MAX_DELTA)),
        kind: TrackEventKind::Midi { channel, message },
    }
}

fn meta_event(message: MetaMessage<'static>) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(message),
    }
}

/// Channels in part order, skipping the percussion channel for pitched parts.
fn assign_channels(request: &RenderRequest<'_>) -> BTreeMap<String, u8> {
    let mut next = 0u8;
    let mut channels = BTreeMap::new();
    for id in request.parts.keys() {
        let percussion = request.timbres.get(id).is_some_and(|t| t.percussion);
        let channel = if percussion {
            PERCUSSION_CHANNEL
        } else {
            if next == PERCUSSION_CHANNEL {
                next += 1;
            }
            let channel = next;
            next = (next + 1) % 16;
            channel
        };
        channels.insert(id.clone(), channel);
    }
    channels
}

fn score_to_smf(request: &RenderRequest<'_>) -> Smf<'static> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    let (beats, unit) = request.time_signature;
    let tempo_micros = (60_000_000 / request.tempo.max(1)).min(0x00FF_FFFF);
    let mut tempo_track: Track<'static> = vec![
        meta_event(MetaMessage::Tempo(u24::new(tempo_micros))),
        meta_event(MetaMessage::TimeSignature(beats, unit.trailing_zeros() as u8, 24, 8)),
    ];
    tempo_track.push(meta_event(MetaMessage::EndOfTrack));
    smf.tracks.push(tempo_track);

    let channels = assign_channels(request);
    for (id, part) in request.parts {
        let Some(timbre) = request.timbres.get(id) else {
            warn!(instrument = %id, "no timbre assigned; part skipped");
            continue;
        };
        let channel = u4::new(channels.get(id).copied().unwrap_or(0));

        let mut track: Track<'static> = vec![meta_event(MetaMessage::TrackName(timbre.name.as_bytes()))];
        track.push(midi_event(
            0,
            channel,
            MidiMessage::ProgramChange {
                program: u7::new(timbre.program),
            },
        ));

        let mut pending_rest = 0u32;
        for note in part.notes() {
            let length = ticks(note.duration);
            let pitches = note.pitch.pitches();
            if pitches.is_empty() {
                pending_rest = pending_rest.saturating_add(length);
                continue;
            }
            for (i, pitch) in pitches.iter().enumerate() {
                let delta = if i == 0 { pending_rest } else { 0 };
                track.push(midi_event(
                    delta,
                    channel,
                    MidiMessage::NoteOn {
                        key: midi_key(pitch.midi_number()),
                        vel: u7::new(VELOCITY),
                    },
                ));
            }
            for (i, pitch) in pitches.iter().enumerate() {
                let delta = if i == 0 { length } else { 0 };
                track.push(midi_event(
                    delta,
                    channel,
                    MidiMessage::NoteOff {
                        key: midi_key(pitch.midi_number()),
                        vel: u7::new(0),
                    },
                ));
            }
            pending_rest = 0;
        }

        track.push(TrackEvent {
            delta: u28::new(pending_rest.min(MAX_DELTA)),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        smf.tracks.push(track);
    }

    smf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::test_support::valid_draft;
    use serde_json::json;
    use tempfile::tempdir;

    fn parts(entries: &[(&str, serde_json::Value)]) -> BTreeMap<String, Part> {
        entries
            .iter()
            .map(|(id, draft)| {
                let profile = instruments::lookup(id).unwrap();
                (id.to_string(), Part::from_draft(draft, profile).unwrap())
            })
            .collect()
    }

    fn program_of(track: &Track<'_>) -> Option<(u8, u8)> {
        track.iter().find_map(|event| match event.kind {
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange { program },
            } => Some((channel.as_int(), program.as_int())),
            _ => None,
        })
    }

    #[test]
    fn test_writes_one_track_per_part_plus_tempo() {
        let dir = tempdir().unwrap();
        let score = parts(&[("violin", valid_draft("violin", 8)), ("cello", valid_draft("cello", 8))]);
        let request = RenderRequest::new(&score, &GlobalParameters::default());

        let artifacts = MidiRenderer::new()
            .render(&request, &dir.path().join("out/piece"))
            .unwrap();
        assert_eq!(artifacts, vec![dir.path().join("out/piece.mid")]);

        let bytes = std::fs::read(&artifacts[0]).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.tracks.len(), 3);
        // BTreeMap order: cello before violin.
        assert_eq!(program_of(&smf.tracks[1]), Some((0, 42)));
        assert_eq!(program_of(&smf.tracks[2]), Some((1, 40)));
    }

    #[test]
    fn test_chords_sound_together_and_rests_delay_the_next_note() {
        let score = parts(&[(
            "piano",
            json!({"notes": [
                {"pitch": "rest", "duration": 1.0},
                {"pitch": "C4 E4 G4", "duration": 2.0, "technique": "normal"}
            ]}),
        )]);
        let request = RenderRequest::new(&score, &GlobalParameters::default());
        let smf = score_to_smf(&request);
        let track = &smf.tracks[1];

        let ons: Vec<(u32, u8)> = track
            .iter()
            .filter_map(|e| match e.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { key, .. },
                    ..
                } => Some((e.delta.as_int(), key.as_int())),
                _ => None,
            })
            .collect();
        assert_eq!(ons, vec![(480, 60), (0, 64), (0, 67)]);

        let first_off = track
            .iter()
            .find(|e| matches!(e.kind, TrackEventKind::Midi { message: MidiMessage::NoteOff { .. }, .. }))
            .unwrap();
        assert_eq!(first_off.delta.as_int(), 960);
    }

    #[test]
    fn test_percussion_uses_channel_nine_and_pitched_parts_skip_it() {
        let mut timbres = BTreeMap::new();
        let mut score = BTreeMap::new();
        let violin = Part::from_draft(&valid_draft("violin", 1), instruments::lookup("violin").unwrap()).unwrap();
        for i in 0..10 {
            let id = format!("v{i:02}");
            score.insert(id.clone(), violin.clone());
            timbres.insert(id, Timbre { name: "Violin", program: 40, percussion: false });
        }
        let perc = Part::from_draft(
            &json!({"notes": [{"pitch": "C4", "duration": 1.0, "technique": "strike"}]}),
            instruments::lookup("percussion").unwrap(),
        )
        .unwrap();
        score.insert("zz percussion".to_string(), perc);
        timbres.insert(
            "zz percussion".to_string(),
            Timbre { name: "Percussion", program: 0, percussion: true },
        );

        let request = RenderRequest {
            parts: &score,
            timbres,
            tempo: 100,
            time_signature: (3, 4),
        };
        let channels = assign_channels(&request);
        assert_eq!(channels["v08"], 8);
        assert_eq!(channels["v09"], 10);
        assert_eq!(channels["zz percussion"], 9);
    }

    #[test]
    fn test_preview_skips_conversion() {
        let dir = tempdir().unwrap();
        let score = parts(&[("violin", valid_draft("violin", 8))]);
        let request = RenderRequest::new(&score, &GlobalParameters::default());
        let renderer = MidiRenderer::new().with_musescore("false", vec!["pdf".to_string()]);

        let artifacts = renderer
            .render_preview(&request, &dir.path().join("revision_1"))
            .unwrap();
        assert_eq!(artifacts, vec![dir.path().join("revision_1.mid")]);
    }

    #[test]
    fn test_failed_conversion_still_returns_the_midi_file() {
        let dir = tempdir().unwrap();
        let score = parts(&[("violin", valid_draft("violin", 8))]);
        let request = RenderRequest::new(&score, &GlobalParameters::default());
        let renderer = MidiRenderer::new()
            .with_musescore("definitely-not-a-musescore-binary", vec!["pdf".to_string()]);

        let artifacts = renderer.render(&request, &dir.path().join("piece")).unwrap();
        assert_eq!(artifacts.len(), 1);
        assert!(artifacts[0].exists());
    }
}
