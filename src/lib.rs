pub mod config;
pub mod dsp;
pub mod error;
pub mod params;

pub use config::{EngineConfig, SynthConfig, VocoderConfig};
pub use dsp::engine::Engine;
pub use dsp::num::{DspNum, Fixed, Wide};
pub use error::{DesignError, EngineError};
pub use params::{AudioParams, ControlSource, ParamMultiplexer};

use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the vocosynth-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// `undefined`/`null` select the default configuration.
fn config_from_js(config: JsValue) -> Result<EngineConfig, JsValue> {
    if config.is_undefined() || config.is_null() {
        return Ok(EngineConfig::default());
    }
    let config: EngineConfig = serde_wasm_bindgen::from_value(config).map_err(js_error)?;
    config.validate().map_err(js_error)?;
    Ok(config)
}

/// WASM-exposed: the default engine configuration as a JS object.
#[wasm_bindgen]
pub fn default_config() -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(&EngineConfig::default()).map_err(js_error)
}

/// WASM-exposed: vocode a modulator buffer with a carrier buffer.
#[wasm_bindgen]
pub fn vocode_samples(
    config: JsValue,
    modulator: &[f32],
    carrier: &[f32],
) -> Result<Vec<f32>, JsValue> {
    let config = config_from_js(config)?;
    dsp::engine::vocode_buffers(&config, modulator, carrier).map_err(js_error)
}

/// WASM-exposed: hold `notes` and render `frames` samples of the synthesizer.
#[wasm_bindgen]
pub fn render_synth_samples(
    config: JsValue,
    notes: &[u32],
    frames: u32,
) -> Result<Vec<f32>, JsValue> {
    let config = config_from_js(config)?;
    let notes: Vec<usize> = notes.iter().map(|&n| n as usize).collect();
    dsp::engine::render_synth(&config, &notes, frames as usize).map_err(js_error)
}

/// WASM-exposed: hold `notes` and vocode `modulator` with the synthesizer.
#[wasm_bindgen]
pub fn vocode_with_synth_samples(
    config: JsValue,
    notes: &[u32],
    modulator: &[f32],
) -> Result<Vec<f32>, JsValue> {
    let config = config_from_js(config)?;
    let notes: Vec<usize> = notes.iter().map(|&n| n as usize).collect();
    dsp::engine::vocode_with_synth(&config, &notes, modulator).map_err(js_error)
}
