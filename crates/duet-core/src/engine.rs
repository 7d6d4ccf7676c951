//! The improvisation engine: learner, model updates, clock and scheduler
//! driven one audio block at a time.

use crate::clock::{Clock, HostTransport};
use crate::config::{EngineConfig, ImproviserKind, PlayMode};
use crate::improviser::{Improvise, Improviser};
use crate::learner::Learner;
use crate::model_io::ModelIo;
use crate::models::ModelSet;
use crate::params::{ParamSnapshot, SharedParams};
use crate::scheduler::{Cycle, CycleSettings, Scheduler};
use crate::update_queue::{update_queue, ModelUpdate, UpdateReceiver, UpdateSender};
use crate::Result;
use duet_midi::{output_channel, EventKind, InputEvent, MidiEvent, OutputConsumer, OutputProducer};
use std::path::Path;
use std::sync::Arc;

/// Salt separating the scheduler's seed from the models' seeds.
const SCHEDULER_SEED_SALT: u64 = 0x5c4e;

const MAX_CC_VALUE: f32 = 127.0;

/// Real-time improviser.
///
/// Call [`Engine::process_block`] once per audio block from the audio
/// thread. Live parameters are changed through [`Engine::params`] from any
/// thread.
///
/// # Example
///
/// ```
/// use duet_core::{Engine, InputEvent};
///
/// let mut engine = Engine::builder().sample_rate(48_000).seed(1).build()?;
///
/// let input = [InputEvent::note_on(0, 0, 60, 100), InputEvent::note_off(4_000, 0, 60)];
/// let output = engine.process_block(&input, 512, None);
/// assert!(output.is_empty());
/// # Ok::<(), duet_core::Error>(())
/// ```
pub struct Engine {
    config: EngineConfig,
    params: Arc<SharedParams>,
    learner: Learner,
    update_tx: UpdateSender,
    update_rx: UpdateReceiver,
    improviser: Improviser,
    clock: Clock,
    scheduler: Scheduler,
    output: Vec<MidiEvent>,
    /// Reused for converted host input.
    input_scratch: Vec<InputEvent>,
    output_producer: Option<OutputProducer>,
    /// Quantum used for the last block, for `flush_input`.
    last_quantum: Option<u64>,
    last_cycle: Cycle,
    model_io: ModelIo,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let (update_tx, update_rx) = update_queue(config.update_queue_capacity);
        let engine = Self {
            params: Arc::new(SharedParams::new(&config)),
            learner: Learner::new(&config),
            update_tx,
            update_rx,
            improviser: Improviser::new(&config),
            clock: Clock::new(config.sample_rate),
            scheduler: Scheduler::new(config.seed.map(|seed| seed.wrapping_add(SCHEDULER_SEED_SALT))),
            output: Vec::with_capacity(64),
            input_scratch: Vec::with_capacity(64),
            output_producer: None,
            last_quantum: None,
            last_cycle: Cycle::NotDue,
            model_io: ModelIo::new(),
            config,
        };
        tracing::info!(
            "Engine ready: {} Hz, order {}, {:?} improviser",
            engine.config.sample_rate,
            engine.config.max_order,
            engine.improviser.kind()
        );
        Ok(engine)
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Live parameters, shareable with a control thread.
    #[inline]
    pub fn params(&self) -> &Arc<SharedParams> {
        &self.params
    }

    #[inline]
    pub fn improviser(&self) -> &Improviser {
        &self.improviser
    }

    #[inline]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Samples processed so far.
    #[inline]
    pub fn elapsed(&self) -> u64 {
        self.scheduler.elapsed()
    }

    /// What the scheduler did in the last block.
    #[inline]
    pub fn last_cycle(&self) -> Cycle {
        self.last_cycle
    }

    /// Sender for model updates produced outside the engine.
    pub fn update_sender(&self) -> UpdateSender {
        self.update_tx.clone()
    }

    /// Updates waiting to be applied.
    pub fn pending_updates(&self) -> usize {
        self.update_rx.len()
    }

    /// The models that are saved and loaded. Loading through this handle
    /// from another thread swaps each model under its own lock.
    pub fn persistent_models(&self) -> Arc<ModelSet> {
        Arc::clone(self.improviser.persistent())
    }

    /// Start mirroring every block's output into a lock-free channel.
    ///
    /// Replaces any previously returned consumer.
    pub fn output_consumer(&mut self) -> OutputConsumer {
        let (producer, consumer) = output_channel();
        self.output_producer = Some(producer);
        consumer
    }

    /// Output channel as 0-15.
    #[inline]
    fn channel(&self) -> u8 {
        self.config.output_channel.clamp(1, 16) - 1
    }

    /// Process one block of `block_len` samples starting at [`Engine::elapsed`].
    ///
    /// `input` timestamps are absolute samples. The returned events carry
    /// offsets into this block, sorted by offset.
    pub fn process_block(
        &mut self,
        input: &[InputEvent],
        block_len: usize,
        host: Option<&HostTransport>,
    ) -> &[MidiEvent] {
        self.run_block(input, block_len, host);
        &self.output
    }

    /// Like [`Engine::process_block`] with host MIDI whose offsets are
    /// relative to this block.
    pub fn process_midi_block(
        &mut self,
        input: &[MidiEvent],
        block_len: usize,
        host: Option<&HostTransport>,
    ) -> &[MidiEvent] {
        let block_start = self.scheduler.elapsed();
        let mut events = std::mem::take(&mut self.input_scratch);
        events.clear();
        events.extend(input.iter().map(|event| InputEvent::from_midi(event, block_start)));
        self.run_block(&events, block_len, host);
        self.input_scratch = events;
        &self.output
    }

    /// Like [`Engine::process_block`] with raw host messages, each paired
    /// with its offset into this block. Unparseable messages are skipped.
    pub fn process_raw_block(
        &mut self,
        input: &[(usize, &[u8])],
        block_len: usize,
        host: Option<&HostTransport>,
    ) -> &[MidiEvent] {
        let block_start = self.scheduler.elapsed();
        let mut events = std::mem::take(&mut self.input_scratch);
        events.clear();
        for &(offset, bytes) in input {
            match InputEvent::from_bytes(bytes, block_start + offset as u64) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => tracing::debug!("Skipping host MIDI {:02X?}: {}", bytes, e),
            }
        }
        self.run_block(&events, block_len, host);
        self.input_scratch = events;
        &self.output
    }

    fn run_block(&mut self, input: &[InputEvent], block_len: usize, host: Option<&HostTransport>) {
        self.output.clear();
        let params = self.params.snapshot();
        let block_start = self.scheduler.elapsed();
        let block_len = block_len as u64;
        let channel = self.channel();

        if self.params.take_panic() {
            self.scheduler.panic(channel, &mut self.output);
        }

        let clock = self.clock.prepare(block_start, block_len, &params, host);
        let quantum = if params.quantize {
            clock.grid.map(|grid| grid.quantum())
        } else {
            None
        };
        self.last_quantum = quantum;

        // controllers are heard on every channel; notes only on the input channel
        for event in input {
            if event.kind == EventKind::ControlChange {
                self.controller(event);
            } else if event.matches_channel(self.config.input_channel) {
                self.improviser.note_message();
                self.learn_note(event, quantum);
            }
        }

        self.apply_updates(&params);

        let settings = CycleSettings {
            playing: params.playing,
            grid: clock.grid,
            sync_to_grid: params.sync_to_grid(),
            realign: clock.realigned,
            play_probability: params.play_probability,
            require_choices: self.config.require_choices,
            channel,
        };
        let (models, source) = self.improviser.models_for(params.mode);
        self.last_cycle = self
            .scheduler
            .process(block_len, models, source, &settings, &mut self.output);

        self.output.sort_by_key(|event| event.frame_offset);
        if let Some(producer) = self.output_producer.as_mut() {
            producer.push_block(block_start, &self.output);
        }
    }

    fn learn_note(&mut self, event: &InputEvent, quantum: Option<u64>) {
        let update = match event.kind {
            EventKind::NoteOn if event.value > 0 => {
                self.learner.note_on(event.key, event.value, event.timestamp, quantum)
            }
            _ => self.learner.note_off(event.key, event.timestamp, quantum),
        };
        if let Some(update) = update {
            self.update_tx.send(update);
        }
    }

    fn controller(&mut self, event: &InputEvent) {
        let burst = self.learner.controller(event.key, event.value, event.timestamp);
        let Some(mapped) = self.config.play_probability_cc else {
            return;
        };
        if let Some(value) = burst.iter().rev().find(|cv| cv.controller == mapped) {
            let probability = f32::from(value.value) / MAX_CC_VALUE;
            tracing::debug!("CC {} set play probability to {:.2}", mapped, probability);
            self.params.set_play_probability(probability);
        }
    }

    fn apply_updates(&mut self, params: &ParamSnapshot) {
        let improviser = &mut self.improviser;
        self.update_rx
            .drain(self.config.updates_per_block, |update| improviser.train(&update, params.learning));
    }

    /// Finalize a chord still waiting for the next note.
    pub fn flush_input(&mut self) {
        if let Some(update) = self.learner.flush(self.last_quantum) {
            self.update_tx.send(update);
        }
    }

    /// Queue an update as if it came from live input.
    pub fn train(&self, update: ModelUpdate) -> bool {
        self.update_tx.send(update)
    }

    pub fn give_feedback(&self, positive: bool) {
        self.improviser.give_feedback(positive);
    }

    /// Forget everything learned. Sounding notes are released next block.
    pub fn reset(&mut self) {
        let dropped = self.update_rx.clear();
        self.improviser.reset();
        self.learner.reset();
        self.params.request_panic();
        tracing::info!("Engine reset ({} pending updates dropped)", dropped);
    }

    /// Switch lead/follow. Sounding notes are released next block.
    pub fn set_mode(&self, mode: PlayMode) {
        self.params.set_mode(mode);
    }

    pub fn set_burst_thresholds(&mut self, note_threshold: u64, controller_threshold: u64) {
        self.learner.set_thresholds(note_threshold, controller_threshold);
    }

    pub fn save_model(&self, path: impl AsRef<Path>) -> Result<()> {
        self.improviser.persistent().save(path)
    }

    pub fn load_model(&self, path: impl AsRef<Path>) -> Result<()> {
        self.improviser.persistent().load(path)
    }

    /// Save on a worker thread. Fails if a load or save is already running.
    pub fn save_model_in_background(&self, path: impl AsRef<Path>) -> Result<()> {
        self.model_io.start_save(self.persistent_models(), path)
    }

    /// Load on a worker thread; the engine keeps playing meanwhile.
    pub fn load_model_in_background(&self, path: impl AsRef<Path>) -> Result<()> {
        self.model_io.start_load(self.persistent_models(), path)
    }

    /// Background load/save status and finished results.
    #[inline]
    pub fn model_io(&self) -> &ModelIo {
        &self.model_io
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("sample_rate", &self.config.sample_rate)
            .field("improviser", &self.improviser.kind())
            .field("elapsed", &self.scheduler.elapsed())
            .field("next_play_time", &self.scheduler.next_play_time())
            .field("pending_updates", &self.update_rx.len())
            .finish()
    }
}

/// Builder for [`Engine`], starting from [`EngineConfig::default`].
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    /// Start from an existing configuration.
    pub fn from_config(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    pub fn max_order(mut self, order: usize) -> Self {
        self.config.max_order = order;
        self
    }

    pub fn chain_memory(mut self, capacity: usize) -> Self {
        self.config.chain_memory = capacity;
        self
    }

    /// Default: `sample_rate / 40` and `sample_rate / 16`.
    pub fn burst_thresholds(mut self, note_threshold: u64, controller_threshold: u64) -> Self {
        self.config.note_burst_threshold = Some(note_threshold);
        self.config.controller_burst_threshold = Some(controller_threshold);
        self
    }

    pub fn max_same_order_repeats(mut self, repeats: usize) -> Self {
        self.config.max_same_order_repeats = repeats;
        self
    }

    pub fn tempo(mut self, bpm: f64, division: u32) -> Self {
        self.config.bpm = bpm;
        self.config.division = division;
        self
    }

    pub fn mode(mut self, mode: PlayMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn quantize(mut self, enabled: bool) -> Self {
        self.config.quantize = enabled;
        self
    }

    pub fn host_clock(mut self, enabled: bool) -> Self {
        self.config.host_clock = enabled;
        self
    }

    /// 0 = omni.
    pub fn input_channel(mut self, channel: u8) -> Self {
        self.config.input_channel = channel;
        self
    }

    pub fn output_channel(mut self, channel: u8) -> Self {
        self.config.output_channel = channel;
        self
    }

    pub fn play_probability(mut self, probability: f32) -> Self {
        self.config.play_probability = probability;
        self
    }

    pub fn play_probability_cc(mut self, controller: u8) -> Self {
        self.config.play_probability_cc = Some(controller);
        self
    }

    pub fn require_choices(mut self, enabled: bool) -> Self {
        self.config.require_choices = enabled;
        self
    }

    pub fn improviser(mut self, kind: ImproviserKind) -> Self {
        self.config.improviser = kind;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn build(self) -> Result<Engine> {
        Engine::new(self.config)
    }
}
