//! ScriptTransfer: transfer functions written in Rhai.
//!
//! ## Props
//!
//! - `script` - inline Rhai source
//! - `script_file` - path of a Rhai source file, read during initialization
//! - `required_inputs` - comma separated ids that must be present before the
//!   script runs
//!
//! ## Engine Limits
//!
//! Scripts run under limits that stop runaway loops and allocations. Each one
//! can be overridden by a prop of the same name; `0` lifts the limit.
//!
//! | Prop | Default |
//! |---|---|
//! | `max_operations` | 1 000 000 |
//! | `max_call_levels` | 32 |
//! | `max_string_size` | 1 MiB (bytes) |
//! | `max_array_size` | 65 536 |
//! | `max_map_size` | 65 536 |
//!
//! The limits apply to input values too: a `STRING` input longer than
//! `max_string_size` fails every evaluation that reads it.
//!
//! ## Script Interface
//!
//! The script receives:
//! - `inputs` - map of input id to sample map
//! - `output` - the current output as a sample map
//! - `props` - the stage props as a map of strings
//!
//! A sample map has `id`, `running_id`, `type`, `mode`, `timestamp` and
//! `value`. Integers and floats keep their numeric type, timestamps are
//! RFC 3339 strings and alarms use their text form (`"SET:HIGH/UNACK"`).
//!
//! The script returns a map with any of:
//! - `value` - the new payload, must fit the output type
//! - `mode` - the new mode name
//! - `triggers` - array of alarm triggers, alarm outputs only
//!
//! Missing keys keep the current payload or mode.
//!
//! ## Helper Functions
//!
//! `worst_mode(a, b)`, `is_operational(mode)`, `alarm_is_set(alarm)`,
//! `deadband(x, center, width)`, `hysteresis(x, prev, low, high)`,
//! `smooth(x, prev, alpha)`, `lerp(a, b, t)`,
//! `map_range(x, in_min, in_max, out_min, out_max)` and `clamp(x, min, max)`.
//! Unknown mode or alarm names, an empty input range and `min > max` raise
//! script errors.
//!
//! ## Example Scripts
//!
//! Average of two temperatures:
//! ```rhai
//! let a = inputs["t1"];
//! let b = inputs["t2"];
//! #{ value: (a.value + b.value) / 2.0, mode: worst_mode(a.mode, b.mode) }
//! ```
//!
//! Over-temperature alarm:
//! ```rhai
//! let t = inputs["temp"].value;
//! if t > 80.0 { #{ triggers: ["set:high"] } } else { #{ triggers: ["clear"] } }
//! ```

use crate::alarm::{AlarmState, Trigger};
use crate::error::{CoreError, Result, ResultExt};
use crate::sample::Sample;
use crate::transfer::props::StageProps;
use crate::transfer::stage::{Inputs, StageContext, TransferFunction};
use crate::types::{OperationalMode, Value, ValueType};
use chrono::{DateTime, Utc};
use rhai::{Dynamic, Engine, EvalAltResult, ImmutableString, Map, Scope, AST};
use std::collections::BTreeSet;
use std::fmt;

type ScriptResult<T> = std::result::Result<T, Box<EvalAltResult>>;

/// Resource limits of the script engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptLimits {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_call_levels: 32,
            max_string_size: 1 << 20,
            max_array_size: 65_536,
            max_map_size: 65_536,
        }
    }
}

impl ScriptLimits {
    /// Defaults overridden by the `max_*` props
    pub fn from_props(props: &StageProps) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_operations: props
                .parse("max_operations")?
                .unwrap_or(defaults.max_operations),
            max_call_levels: props
                .parse("max_call_levels")?
                .unwrap_or(defaults.max_call_levels),
            max_string_size: props
                .parse("max_string_size")?
                .unwrap_or(defaults.max_string_size),
            max_array_size: props
                .parse("max_array_size")?
                .unwrap_or(defaults.max_array_size),
            max_map_size: props
                .parse("max_map_size")?
                .unwrap_or(defaults.max_map_size),
        })
    }

    fn apply(&self, engine: &mut Engine) {
        engine.set_max_operations(self.max_operations);
        engine.set_max_call_levels(self.max_call_levels);
        engine.set_max_string_size(self.max_string_size);
        engine.set_max_array_size(self.max_array_size);
        engine.set_max_map_size(self.max_map_size);
    }
}

/// A transfer function that runs a Rhai script on every evaluation
pub struct ScriptTransfer {
    engine: Engine,
    limits: ScriptLimits,
    /// Compiled AST, present once initialized
    compiled: Option<AST>,
    required_inputs: Vec<String>,
    props: Map,
}

impl ScriptTransfer {
    pub const NAME: &'static str = "script";

    pub fn new() -> Self {
        let mut engine = Engine::new();
        configure_engine(&mut engine);
        let limits = ScriptLimits::default();
        limits.apply(&mut engine);
        Self {
            engine,
            limits,
            compiled: None,
            required_inputs: Vec::new(),
            props: Map::new(),
        }
    }

    /// Check that `source` compiles without building a stage
    pub fn validate(source: &str) -> Result<()> {
        Self::new()
            .engine
            .compile(source)
            .map(|_| ())
            .map_err(|e| CoreError::Script(format!("Validation error: {}", e)))
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    pub fn limits(&self) -> &ScriptLimits {
        &self.limits
    }

    fn load_source(ctx: &StageContext) -> Result<String> {
        let props = ctx.props();
        match (props.get("script"), props.get("script_file")) {
            (Some(_), Some(_)) => Err(CoreError::invalid(format!(
                "{}: set either 'script' or 'script_file', not both",
                ctx.running_id()
            ))),
            (Some(source), None) => Ok(source.to_string()),
            (None, Some(path)) => std::fs::read_to_string(path)
                .map_err(CoreError::from)
                .with_context(|| format!("Failed to read script file {:?}", path)),
            (None, None) => Err(CoreError::invalid(format!(
                "{}: missing required property 'script' or 'script_file'",
                ctx.running_id()
            ))),
        }
    }

    fn run(&self, ctx: &StageContext, ast: &AST, inputs: &Inputs, current: &Sample) -> Result<Map> {
        let inputs_map: Map = inputs
            .iter()
            .map(|(id, sample)| (id.as_str().into(), Dynamic::from(sample_to_map(sample))))
            .collect();

        let mut scope = Scope::new();
        scope.push("inputs", inputs_map);
        scope.push("output", sample_to_map(current));
        scope.push("props", self.props.clone());

        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, ast)
            .map_err(|e| ctx.evaluation_error(format!("Script failed: {}", e)))?;

        let type_name = result.type_name();
        result.try_cast::<Map>().ok_or_else(|| {
            ctx.evaluation_error(format!("Script must return a map, got {}", type_name))
        })
    }

    fn apply(&self, ctx: &StageContext, result: Map, current: &Sample) -> Result<Sample> {
        let value_type = current.value_type();

        let mut value = match result.get("value") {
            Some(v) if !v.is_unit() => dynamic_to_value(v, value_type)
                .map_err(|e| ctx.evaluation_error(format!("Bad 'value': {}", e)))?,
            _ => current.value().clone(),
        };

        let mode = match result.get("mode") {
            Some(m) if !m.is_unit() => {
                let name = m.clone().into_string().map_err(|t| {
                    ctx.evaluation_error(format!("'mode' must be a string, got {}", t))
                })?;
                name.parse::<OperationalMode>()
                    .map_err(|e| ctx.evaluation_error(e.to_string()))?
            }
            _ => current.mode(),
        };

        if let Some(raw) = result.get("triggers").filter(|t| !t.is_unit()) {
            let triggers = parse_triggers(raw).map_err(|e| ctx.evaluation_error(e))?;
            let alarm = value.as_alarm().copied().ok_or_else(|| {
                ctx.evaluation_error(format!("'triggers' need an ALARM output, not {}", value_type))
            })?;
            value = Value::Alarm(AlarmState::transition(alarm, &triggers));
        }

        current
            .with_value_and_mode(value, mode, ctx.clock())
            .map_err(|e| ctx.evaluation_error(e.to_string()))
    }
}

impl Default for ScriptTransfer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScriptTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptTransfer")
            .field("compiled", &self.compiled.is_some())
            .field("limits", &self.limits)
            .field("required_inputs", &self.required_inputs)
            .finish()
    }
}

impl TransferFunction for ScriptTransfer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn initialize(&mut self, ctx: &StageContext) -> Result<()> {
        self.limits = ScriptLimits::from_props(ctx.props())
            .with_context(|| format!("Configuring {}", ctx.running_id()))?;
        self.limits.apply(&mut self.engine);

        let source = Self::load_source(ctx)?;
        let ast = self
            .engine
            .compile(&source)
            .map_err(|e| CoreError::Script(format!("Compile error in {}: {}", ctx.running_id(), e)))?;

        self.required_inputs = ctx
            .props()
            .list("required_inputs")
            .into_iter()
            .map(str::to_string)
            .collect();
        self.props = ctx
            .props()
            .iter()
            .map(|(k, v)| (k.into(), Dynamic::from(ImmutableString::from(v))))
            .collect();
        self.compiled = Some(ast);

        tracing::debug!("Script for {} compiled successfully", ctx.running_id());
        Ok(())
    }

    fn evaluate(
        &mut self,
        ctx: &StageContext,
        inputs: &Inputs,
        current_output: &Sample,
    ) -> Result<Sample> {
        for id in &self.required_inputs {
            ctx.require_input(inputs, id)?;
        }
        let ast = self
            .compiled
            .as_ref()
            .ok_or_else(|| ctx.evaluation_error("No compiled script"))?;

        let result = self.run(ctx, ast, inputs, current_output)?;
        self.apply(ctx, result, current_output)
    }

    fn shutdown(&mut self, _ctx: &StageContext) -> Result<()> {
        self.compiled = None;
        Ok(())
    }
}

fn script_mode(name: &str) -> ScriptResult<OperationalMode> {
    name.parse::<OperationalMode>().map_err(|e| e.to_string().into())
}

/// Nesting limits and helper functions available to every script
fn configure_engine(engine: &mut Engine) {
    engine.set_max_expr_depths(64, 64);

    engine.on_print(|text| tracing::debug!("[script] {}", text));
    engine.on_debug(|text, _source, pos| tracing::debug!("[script {}] {}", pos, text));

    // Modes
    engine.register_fn(
        "worst_mode",
        |a: ImmutableString, b: ImmutableString| -> ScriptResult<String> {
            Ok(script_mode(&a)?.max(script_mode(&b)?).to_string())
        },
    );
    engine.register_fn("is_operational", |mode: ImmutableString| -> ScriptResult<bool> {
        Ok(script_mode(&mode)? == OperationalMode::Operational)
    });

    // Alarms
    engine.register_fn("alarm_is_set", |alarm: ImmutableString| -> ScriptResult<bool> {
        alarm
            .parse::<AlarmState>()
            .map(|a| a.is_set())
            .map_err(|e| e.to_string().into())
    });

    // Signal helpers
    engine.register_fn("deadband", |value: f64, center: f64, width: f64| -> f64 {
        if (value - center).abs() < width / 2.0 {
            center
        } else {
            value
        }
    });
    engine.register_fn(
        "hysteresis",
        |input: f64, prev: bool, low_thresh: f64, high_thresh: f64| -> bool {
            if input >= high_thresh {
                true
            } else if input <= low_thresh {
                false
            } else {
                prev
            }
        },
    );
    engine.register_fn("smooth", |current: f64, previous: f64, alpha: f64| -> f64 {
        let alpha = alpha.clamp(0.0, 1.0);
        if previous.is_nan() {
            current
        } else {
            alpha * previous + (1.0 - alpha) * current
        }
    });
    engine.register_fn("lerp", |a: f64, b: f64, t: f64| a + (b - a) * t);
    engine.register_fn(
        "map_range",
        |x: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64| -> ScriptResult<f64> {
            if in_min == in_max {
                return Err(format!("map_range: empty input range at {}", in_min).into());
            }
            Ok((x - in_min) * (out_max - out_min) / (in_max - in_min) + out_min)
        },
    );
    engine.register_fn("clamp", |x: f64, min: f64, max: f64| -> ScriptResult<f64> {
        // f64::clamp panics on these
        if min.is_nan() || max.is_nan() || min > max {
            return Err(format!("clamp: min {} is not below max {}", min, max).into());
        }
        Ok(x.clamp(min, max))
    });
}

fn sample_to_map(sample: &Sample) -> Map {
    let mut map = Map::new();
    map.insert("id".into(), Dynamic::from(ImmutableString::from(sample.id())));
    map.insert(
        "running_id".into(),
        Dynamic::from(ImmutableString::from(sample.running_id())),
    );
    map.insert("type".into(), Dynamic::from(ImmutableString::from(sample.value_type().as_str())));
    map.insert("mode".into(), Dynamic::from(ImmutableString::from(sample.mode().as_str())));
    map.insert(
        "timestamp".into(),
        Dynamic::from(ImmutableString::from(sample.timestamp().to_rfc3339())),
    );
    map.insert("value".into(), value_to_dynamic(sample.value()));
    map
}

fn value_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Int64(v) => Dynamic::from(*v),
        Value::Int32(v) => Dynamic::from(i64::from(*v)),
        Value::Float64(v) => Dynamic::from(*v),
        Value::Float32(v) => Dynamic::from(f64::from(*v)),
        Value::Boolean(v) => Dynamic::from(*v),
        Value::Char(v) => Dynamic::from(*v),
        Value::String(v) => Dynamic::from(ImmutableString::from(v.as_str())),
        Value::Timestamp(v) => Dynamic::from(ImmutableString::from(v.to_rfc3339())),
        Value::Alarm(v) => Dynamic::from(ImmutableString::from(v.to_string())),
    }
}

/// Convert a script result into a payload of `value_type`.
///
/// Integers are accepted where floats are expected; nothing else is coerced.
fn dynamic_to_value(value: &Dynamic, value_type: ValueType) -> std::result::Result<Value, String> {
    let mismatch = || format!("expected {}, got {}", value_type, value.type_name());
    let as_float = || {
        value
            .as_float()
            .or_else(|_| value.as_int().map(|i| i as f64))
            .map_err(|_| mismatch())
    };
    let as_text = || value.clone().into_string().map_err(|_| mismatch());

    Ok(match value_type {
        ValueType::Int64 => Value::Int64(value.as_int().map_err(|_| mismatch())?),
        ValueType::Int32 => {
            let wide = value.as_int().map_err(|_| mismatch())?;
            Value::Int32(
                i32::try_from(wide).map_err(|_| format!("{} does not fit in INT32", wide))?,
            )
        }
        ValueType::Float64 => Value::Float64(as_float()?),
        ValueType::Float32 => {
            let wide = as_float()?;
            if wide.is_finite() && wide.abs() > f64::from(f32::MAX) {
                return Err(format!("{} does not fit in FLOAT32", wide));
            }
            Value::Float32(wide as f32)
        }
        ValueType::Boolean => Value::Boolean(value.as_bool().map_err(|_| mismatch())?),
        ValueType::Char => Value::Char(value.as_char().map_err(|_| mismatch())?),
        ValueType::String => Value::String(as_text()?),
        ValueType::Timestamp => {
            let text = as_text()?;
            Value::Timestamp(
                DateTime::parse_from_rfc3339(&text)
                    .map_err(|e| format!("bad timestamp '{}': {}", text, e))?
                    .with_timezone(&Utc),
            )
        }
        ValueType::Alarm => Value::Alarm(
            as_text()?
                .parse::<AlarmState>()
                .map_err(|e| e.to_string())?,
        ),
    })
}

fn parse_triggers(raw: &Dynamic) -> std::result::Result<BTreeSet<Trigger>, String> {
    let items = raw
        .clone()
        .try_cast::<rhai::Array>()
        .ok_or_else(|| format!("'triggers' must be an array, got {}", raw.type_name()))?;
    items
        .into_iter()
        .map(|item| {
            let text = item
                .into_string()
                .map_err(|t| format!("trigger must be a string, got {}", t))?;
            text.parse::<Trigger>().map_err(|e| e.to_string())
        })
        .collect()
}
