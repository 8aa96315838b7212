use crate::host::BrowserHost;
use crate::logger;
use hyplot_core::error::PlotError;
use hyplot_core::line::{LineSetting, Readiness};
use hyplot_core::line_map::PlotLineMap;
use hyplot_core::settings::PlotSettings;
use hyplot_core::trace::Trace;
use hyplot_core::traits::LineId;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

#[derive(Debug, Clone, Serialize)]
struct PlotProgress {
    done: bool,
    lines_plotting: usize,
    pending_frames: usize,
    trajectories: usize,
}

#[derive(Debug, Clone, Serialize)]
struct LineInfo {
    index: usize,
    x: String,
    y: String,
    z: String,
    readiness: Readiness,
    plotting: bool,
    color_angle: f64,
    trajectories: usize,
}

fn plot_error(err: PlotError) -> JsValue {
    JsValue::from_str(&err.failure_message())
}

fn serialize<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    to_value(value).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Incremental plotter driven by the page's `requestAnimationFrame` loop.
///
/// Call `run_frame` once per animation frame until `is_done`, then apply
/// `take_scene_commands` to the three.js scene and show
/// `take_notifications`.
#[wasm_bindgen]
pub struct WasmPlotter {
    map: PlotLineMap,
    browser: BrowserHost,
}

#[wasm_bindgen]
impl WasmPlotter {
    #[wasm_bindgen(constructor)]
    pub fn new(settings: JsValue) -> Result<WasmPlotter, JsValue> {
        logger::init();

        let settings = parse_settings(settings)?;
        Ok(WasmPlotter {
            map: PlotLineMap::new(settings),
            browser: BrowserHost::new(),
        })
    }

    pub fn set_settings(&mut self, settings: JsValue) -> Result<(), JsValue> {
        let settings = parse_settings(settings)?;
        self.map.set_settings(settings).map_err(plot_error)
    }

    /// Loads a trace in the simulator's JSON format and plots the default
    /// line. Returns that line's index.
    pub fn load_trace(&mut self, json: &str) -> Result<u32, JsValue> {
        let trace = Trace::from_json(json).map_err(|e| JsValue::from_str(&format!("{:#}", e)))?;
        let id = self
            .map
            .load_trace(trace, &mut self.browser.host())
            .map_err(plot_error)?;
        Ok(id.0 as u32)
    }

    pub fn add_line(&mut self, x: &str, y: &str, z: &str) -> u32 {
        let id = self
            .map
            .add_line(LineSetting::new(x, y, z), &mut self.browser.scene);
        id.0 as u32
    }

    pub fn add_line_with_index(&mut self, index: u32, x: &str, y: &str, z: &str) -> u32 {
        let id = self.map.add_line_with_index(
            index as usize,
            LineSetting::new(x, y, z),
            &mut self.browser.scene,
        );
        id.0 as u32
    }

    /// Changes a line's axis formulas and replots it.
    pub fn set_line(&mut self, index: u32, x: &str, y: &str, z: &str) -> Result<bool, JsValue> {
        let id = LineId(index as usize);
        let line = self
            .map
            .line_mut(id)
            .ok_or_else(|| JsValue::from_str("Unknown line index"))?;
        line.set_setting(LineSetting::new(x, y, z));
        self.map
            .replot_line(id, &mut self.browser.host())
            .map_err(plot_error)
    }

    pub fn remove_line(&mut self, index: u32) -> bool {
        self.map
            .remove_line(LineId(index as usize), &mut self.browser.scene)
    }

    pub fn replot_line(&mut self, index: u32) -> Result<bool, JsValue> {
        self.map
            .replot_line(LineId(index as usize), &mut self.browser.host())
            .map_err(plot_error)
    }

    pub fn replot_all(&mut self) -> Result<(), JsValue> {
        self.map
            .replot_all(&mut self.browser.host())
            .map_err(plot_error)
    }

    pub fn is_done(&self) -> bool {
        self.map.is_all_ready() && self.browser.frames.is_empty()
    }

    /// Serves the frame requests queued since the previous call.
    pub fn run_frame(&mut self) -> Result<JsValue, JsValue> {
        let requests = self.browser.frames.drain();
        self.map.run_frame(requests, &mut self.browser.host());
        self.get_progress()
    }

    pub fn get_progress(&self) -> Result<JsValue, JsValue> {
        let progress = PlotProgress {
            done: self.is_done(),
            lines_plotting: self.map.lines().filter(|line| line.is_plotting()).count(),
            pending_frames: self.browser.frames.len(),
            trajectories: self.map.trajectories().len(),
        };
        serialize(&progress)
    }

    pub fn get_lines(&self) -> Result<JsValue, JsValue> {
        let lines: Vec<LineInfo> = self
            .map
            .lines()
            .map(|line| LineInfo {
                index: line.id().0,
                x: line.setting().x.clone(),
                y: line.setting().y.clone(),
                z: line.setting().z.clone(),
                readiness: line.readiness(),
                plotting: line.is_plotting(),
                color_angle: line.color_angle(),
                trajectories: line.trajectories().len(),
            })
            .collect();
        serialize(&lines)
    }

    pub fn animate_time(&mut self) {
        self.map.animate_time();
    }

    /// Moves the markers for the current playback time. Returns whether any
    /// marker command was queued.
    pub fn animate(&mut self) -> bool {
        self.map.animate(&mut self.browser.scene)
    }

    pub fn show_ranges(&mut self) -> u32 {
        self.map.show_ranges(&mut self.browser.scene) as u32
    }

    pub fn clear_ranges(&mut self) {
        self.map.clear_ranges(&mut self.browser.scene);
    }

    /// Camera zoom used for the width and dash length of later plots.
    pub fn set_zoom(&mut self, zoom: f64) {
        self.browser.scene.set_zoom(zoom);
    }

    pub fn take_scene_commands(&mut self) -> Result<JsValue, JsValue> {
        serialize(&self.browser.scene.take_commands())
    }

    pub fn take_notifications(&mut self) -> Result<JsValue, JsValue> {
        serialize(&self.browser.notifier.take())
    }
}

fn parse_settings(settings: JsValue) -> Result<PlotSettings, JsValue> {
    if settings.is_undefined() || settings.is_null() {
        return Ok(PlotSettings::default());
    }
    let settings: PlotSettings = from_value(settings)
        .map_err(|e| JsValue::from_str(&format!("Invalid plot settings: {}", e)))?;
    settings.validate().map_err(plot_error)?;
    Ok(settings)
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::WasmPlotter;
    use hyplot_core::settings::{ParameterSetting, PlotSettings};
    use serde_wasm_bindgen::to_value;
    use wasm_bindgen::JsValue;
    use wasm_bindgen_test::wasm_bindgen_test;

    const TRACE: &str = r#"{
        "name": "ball",
        "variables": ["y"],
        "parameters": {"g": {"unique_value": "10"}},
        "first_phases": [{
            "type": "PP",
            "time": {"time_point": "0"},
            "variable_map": {"y": {"unique_value": "1"}},
            "parameter_maps": [{}],
            "simulation_state": "SIMULATED",
            "children": [{
                "type": "IP",
                "time": {"start_time": "0", "end_time": "0.4"},
                "variable_map": {"y": {"unique_value": "1 - g * t^2 / 2"}},
                "parameter_maps": [{"g": {"unique_value": "10"}}],
                "simulation_state": "TIME_LIMIT",
                "children": []
            }]
        }]
    }"#;

    fn settings_value() -> JsValue {
        let mut settings = PlotSettings::default();
        settings
            .parameter_condition
            .insert("g".to_string(), ParameterSetting::fixed(10.0));
        to_value(&settings).expect("settings")
    }

    #[wasm_bindgen_test]
    fn plots_trace_to_completion() {
        let mut plotter = WasmPlotter::new(settings_value()).expect("plotter");
        assert_eq!(plotter.load_trace(TRACE).expect("load"), 0);
        let mut frames = 0;
        while !plotter.is_done() {
            plotter.run_frame().expect("frame");
            frames += 1;
            assert!(frames < 1000, "plot does not finish");
        }
        assert!(plotter.animate());
        let commands = plotter.take_scene_commands().expect("commands");
        assert!(js_sys::Array::is_array(&commands));
        assert!(js_sys::Array::from(&commands).length() >= 3);
    }

    #[wasm_bindgen_test]
    fn rejects_malformed_trace() {
        let mut plotter = WasmPlotter::new(JsValue::UNDEFINED).expect("plotter");
        let message = plotter
            .load_trace("{\"name\": 1}")
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("Malformed trace JSON"));
    }

    #[wasm_bindgen_test]
    fn missing_parameter_setting_fails_the_plot() {
        let mut plotter = WasmPlotter::new(JsValue::UNDEFINED).expect("plotter");
        let message = plotter
            .load_trace(TRACE)
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.starts_with("Plot failed: MissingParameterSettingError("));
    }
}
