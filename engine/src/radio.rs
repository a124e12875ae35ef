//! Per-channel cache cells.
//!
//! One [`RadioRecord`] per channel an entity carries. Local channels are
//! addressed by variable name, relayed channels by (object, variable); the
//! query functions differ only in prefix and argument shape.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use relay_core::CachedValue;
use relay_types::{ChannelDescriptor, ChannelId, StateValue};

use crate::context::RelayContext;

pub struct RadioRecord {
    ctx: Arc<RelayContext>,
    id: ChannelId,
    confirmed: AtomicBool,
    speaker_enabled: Arc<CachedValue<bool>>,
    radio_code: Arc<CachedValue<String>>,
    frequencies: Arc<CachedValue<Vec<String>>>,
    network_id: Arc<CachedValue<String>>,
    volume: Arc<CachedValue<f32>>,
}

impl RadioRecord {
    /// Build the record and queue an initial fetch of every cell.
    pub fn new(ctx: &Arc<RelayContext>, id: ChannelId) -> Arc<Self> {
        let intervals = &ctx.settings().cells;
        let record = Arc::new_cyclic(|this: &Weak<Self>| {
            let label = id.to_string();

            let speaker_enabled = {
                let this = this.clone();
                ctx.cell(
                    format!("{label}.speaker"),
                    false,
                    intervals.speaker_enabled,
                    move || {
                        this.upgrade().is_some_and(|radio| {
                            radio.call_getter("Speakers").as_bool().unwrap_or(false)
                        })
                    },
                )
            };

            let radio_code = {
                let this = this.clone();
                ctx.cell(
                    format!("{label}.code"),
                    String::new(),
                    intervals.radio_code,
                    move || {
                        this.upgrade()
                            .and_then(|radio| radio.call_getter("RadioCode").as_text())
                            .unwrap_or_default()
                    },
                )
            };

            let frequencies = {
                let this = this.clone();
                ctx.cell(
                    format!("{label}.freqs"),
                    Vec::new(),
                    intervals.frequencies,
                    move || {
                        this.upgrade()
                            .map(|radio| radio.query_frequencies())
                            .unwrap_or_default()
                    },
                )
            };

            let network_id = {
                let this = this.clone();
                // Local channels are addressed by their variable; it never changes.
                let default = match &id {
                    ChannelId::Local { variable } => variable.clone(),
                    ChannelId::Relayed { .. } => String::new(),
                };
                ctx.cell(
                    format!("{label}.netid"),
                    default,
                    intervals.network_id,
                    move || {
                        this.upgrade()
                            .map(|radio| radio.query_network_id())
                            .unwrap_or_default()
                    },
                )
            };

            let volume = {
                let this = this.clone();
                ctx.cell(
                    format!("{label}.volume"),
                    0.0_f32,
                    intervals.radio_volume,
                    move || {
                        this.upgrade()
                            .and_then(|radio| radio.call_getter("Volume").as_f32())
                            .unwrap_or(0.0)
                    },
                )
            };

            Self {
                ctx: Arc::clone(ctx),
                id,
                confirmed: AtomicBool::new(true),
                speaker_enabled,
                radio_code,
                frequencies,
                network_id,
                volume,
            }
        });
        record.prime();
        record
    }

    fn prime(&self) {
        self.speaker_enabled.force_update();
        self.radio_code.force_update();
        self.frequencies.force_update();
        self.network_id.force_update();
        self.volume.force_update();
    }

    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    pub fn speaker_enabled(&self) -> &Arc<CachedValue<bool>> {
        &self.speaker_enabled
    }

    pub fn radio_code(&self) -> &Arc<CachedValue<String>> {
        &self.radio_code
    }

    pub fn frequencies(&self) -> &Arc<CachedValue<Vec<String>>> {
        &self.frequencies
    }

    pub fn network_id(&self) -> &Arc<CachedValue<String>> {
        &self.network_id
    }

    pub fn volume(&self) -> &Arc<CachedValue<f32>> {
        &self.volume
    }

    pub(crate) fn unconfirm(&self) {
        self.confirmed.store(false, Ordering::Relaxed);
    }

    pub(crate) fn confirm(&self) {
        self.confirmed.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_confirmed(&self) -> bool {
        self.confirmed.load(Ordering::Relaxed)
    }

    /// Descriptor for the `SPEAKERS` record, or `None` while the speaker is off.
    pub fn speaker_descriptor(
        &self,
        speaker_name: &str,
        vehicle_id: &str,
        eye_height: f32,
    ) -> Option<ChannelDescriptor> {
        if !self.speaker_enabled.get() {
            return None;
        }
        Some(ChannelDescriptor {
            network_id: self.network_id.get(),
            frequencies: self.frequencies.get(),
            speaker_name: speaker_name.to_string(),
            volume: self.volume.get(),
            vehicle_id: vehicle_id.to_string(),
            eye_height,
        })
    }

    fn prefix(&self) -> &'static str {
        if self.id.is_relayed() { "Lr" } else { "Sw" }
    }

    /// Getter arguments: `[variable]` locally, `[object, variable]` relayed.
    fn args(&self) -> Vec<StateValue> {
        match &self.id {
            ChannelId::Local { variable } => vec![StateValue::text(variable)],
            ChannelId::Relayed { object, variable } => {
                vec![StateValue::Object(*object), StateValue::text(variable)]
            }
        }
    }

    /// The channel as a single value, for functions that take it alongside
    /// other arguments.
    fn reference(&self) -> StateValue {
        match &self.id {
            ChannelId::Local { variable } => StateValue::text(variable),
            ChannelId::Relayed { .. } => StateValue::Array(self.args()),
        }
    }

    fn call_getter(&self, what: &str) -> StateValue {
        let name = format!("TFAR_fnc_get{}{what}", self.prefix());
        self.ctx.call_function(&name, &self.args())
    }

    /// Main frequency plus the additional channel when one is set, each
    /// suffixed with the radio code.
    fn query_frequencies(&self) -> Vec<String> {
        let code = self.radio_code.get();
        let mut frequencies = Vec::with_capacity(2);

        let main = self.call_getter("Frequency").as_text().unwrap_or_default();
        frequencies.push(format!("{main}{code}"));

        let additional = self
            .ctx
            .call_function(
                &format!("TFAR_fnc_getAdditional{}Channel", self.prefix()),
                &self.args(),
            )
            .as_f32()
            .unwrap_or(-1.0);
        if additional > -1.0 {
            let channel = StateValue::Number(f64::from(additional) + 1.0);
            let extra = self
                .ctx
                .call_function("TFAR_fnc_getChannelFrequency", &[self.reference(), channel])
                .as_text()
                .unwrap_or_default();
            frequencies.push(format!("{extra}{code}"));
        }
        frequencies
    }

    fn query_network_id(&self) -> String {
        match &self.id {
            ChannelId::Local { variable } => variable.clone(),
            ChannelId::Relayed { object, .. } => self.ctx.query().net_id(*object),
        }
    }
}
