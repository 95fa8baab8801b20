//! Vocabulary: property keys and object classes understood by the engine.

// Classes, as values of `TYPE`.
pub const GRAPH: &str = "ens:Graph";
pub const BLOCK: &str = "ens:Block";
pub const INPUT_PORT: &str = "lv2:InputPort";
pub const OUTPUT_PORT: &str = "lv2:OutputPort";
pub const AUDIO_PORT: &str = "lv2:AudioPort";
pub const CONTROL_PORT: &str = "lv2:ControlPort";
pub const CV_PORT: &str = "lv2:CVPort";
pub const ATOM_PORT: &str = "atom:AtomPort";

// Keys.
pub const TYPE: &str = "rdf:type";
pub const PROTOTYPE: &str = "ens:prototype";
pub const VALUE: &str = "ens:value";
pub const POLYPHONY: &str = "ens:polyphony";
pub const POLYPHONIC: &str = "ens:polyphonic";
pub const ENABLED: &str = "ens:enabled";
/// Port monitoring switch.
pub const BROADCAST: &str = "ens:broadcast";
/// Peak level reported for monitored signal ports.
pub const ACTIVITY: &str = "ens:activity";
pub const NAME: &str = "lv2:name";
pub const SYMBOL: &str = "lv2:symbol";
pub const INDEX: &str = "lv2:index";
pub const MINIMUM: &str = "lv2:minimum";
pub const MAXIMUM: &str = "lv2:maximum";
pub const DEFAULT: &str = "lv2:default";

/// Value matching every value of a key in a delta's remove set.
pub const WILDCARD: &str = "ens:wildcard";

/// Largest graph polyphony.
pub const MAX_POLYPHONY: u32 = 128;
