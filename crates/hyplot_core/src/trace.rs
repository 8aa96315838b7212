//! Typed simulation trace: a tree of point and interval phases.
//!
//! Phases live in an arena (`PhaseTree`) and refer to their children by
//! `PhaseId`, so traversal state is a plain stack of indices. The raw JSON
//! shape emitted by the simulator is converted once, with every expression
//! parsed up front.

use crate::error::PlotError;
use crate::expression::{normalize_symbol, parse, Expr};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

/// Index of a phase inside its `PhaseTree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhaseId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Point,
    Interval,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PhaseTime {
    Point { time: Expr },
    Interval { start: Expr, end: Expr },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationStatus {
    Simulated,
    TimeLimitReached,
    StepLimitReached,
    Other(String),
}

impl SimulationStatus {
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "SIMULATED" => SimulationStatus::Simulated,
            "TIME_LIMIT" => SimulationStatus::TimeLimitReached,
            "STEP_LIMIT" => SimulationStatus::StepLimitReached,
            other => SimulationStatus::Other(other.to_string()),
        }
    }

    /// Whether a phase with this status carries samples worth plotting.
    pub fn has_data(&self) -> bool {
        !matches!(self, SimulationStatus::Other(_))
    }
}

/// Value of a parameter as declared by a phase: a point or an interval.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterDescriptor {
    Point(Expr),
    Interval { lower: Expr, upper: Expr },
}

/// Parameter constraints keyed by normalized parameter name.
pub type ParameterMap = BTreeMap<String, ParameterDescriptor>;

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseNode {
    pub time: PhaseTime,
    pub variable_bindings: BTreeMap<String, Expr>,
    /// Alternative applicability sets. The phase applies if any one matches.
    pub parameter_maps: Vec<ParameterMap>,
    pub status: SimulationStatus,
    pub children: Vec<PhaseId>,
}

impl PhaseNode {
    pub fn point(time: Expr) -> Self {
        Self::with_time(PhaseTime::Point { time })
    }

    pub fn interval(start: Expr, end: Expr) -> Self {
        Self::with_time(PhaseTime::Interval { start, end })
    }

    fn with_time(time: PhaseTime) -> Self {
        Self {
            time,
            variable_bindings: BTreeMap::new(),
            parameter_maps: Vec::new(),
            status: SimulationStatus::Simulated,
            children: Vec::new(),
        }
    }

    pub fn with_binding(mut self, name: &str, expr: Expr) -> Self {
        self.variable_bindings.insert(normalize_symbol(name), expr);
        self
    }

    pub fn with_parameter_map(mut self, map: ParameterMap) -> Self {
        self.parameter_maps.push(map);
        self
    }

    pub fn with_status(mut self, status: SimulationStatus) -> Self {
        self.status = status;
        self
    }

    pub fn kind(&self) -> PhaseKind {
        match self.time {
            PhaseTime::Point { .. } => PhaseKind::Point,
            PhaseTime::Interval { .. } => PhaseKind::Interval,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Arena of phases. Parents own their children through `PhaseId`s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseTree {
    nodes: Vec<PhaseNode>,
    roots: Vec<PhaseId>,
}

impl PhaseTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root(&mut self, node: PhaseNode) -> PhaseId {
        let id = self.push(node);
        self.roots.push(id);
        id
    }

    pub fn add_child(&mut self, parent: PhaseId, node: PhaseNode) -> PhaseId {
        let id = self.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    fn push(&mut self, mut node: PhaseNode) -> PhaseId {
        node.children.clear();
        let id = PhaseId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: PhaseId) -> &PhaseNode {
        &self.nodes[id.0]
    }

    pub fn roots(&self) -> &[PhaseId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A loaded simulation trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub name: String,
    pub variables: Vec<String>,
    /// Free parameters in declaration order.
    pub parameters: Vec<(String, ParameterDescriptor)>,
    /// Shared with every traversal plotting this trace.
    pub phases: Rc<PhaseTree>,
}

impl Trace {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        use anyhow::Context;
        let raw: TraceRaw = serde_json::from_str(json).context("Malformed trace JSON")?;
        let trace = Trace::from_raw(raw).context("Invalid trace")?;
        Ok(trace)
    }

    pub fn from_raw(raw: TraceRaw) -> Result<Self, PlotError> {
        let parameters = raw
            .parameters
            .0
            .iter()
            .map(|(name, p)| Ok((normalize_symbol(name), convert_parameter(name, p)?)))
            .collect::<Result<Vec<_>, PlotError>>()?;

        let mut phases = PhaseTree::new();
        // Explicit stack; children pushed in reverse so siblings keep their order.
        let mut pending: Vec<(&PhaseRaw, Option<PhaseId>)> =
            raw.first_phases.iter().rev().map(|p| (p, None)).collect();
        while let Some((phase_raw, parent)) = pending.pop() {
            let node = convert_phase(phase_raw)?;
            let id = match parent {
                Some(parent) => phases.add_child(parent, node),
                None => phases.add_root(node),
            };
            pending.extend(phase_raw.children.iter().rev().map(|c| (c, Some(id))));
        }

        Ok(Trace {
            name: raw.name,
            variables: raw.variables,
            parameters,
            phases: Rc::new(phases),
        })
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|(name, _)| name.as_str())
    }
}

fn parse_field(text: &str, what: &str) -> Result<Expr, PlotError> {
    parse(text).map_err(|e| PlotError::InvalidTrace(format!("{what} '{text}': {e}")))
}

fn convert_parameter(name: &str, raw: &ParameterRaw) -> Result<ParameterDescriptor, PlotError> {
    match raw {
        ParameterRaw::Point { unique_value } => Ok(ParameterDescriptor::Point(parse_field(
            unique_value,
            &format!("parameter {name}"),
        )?)),
        ParameterRaw::Interval {
            lower_bounds,
            upper_bounds,
        } => {
            let lower = match lower_bounds.first() {
                Some(bound) => parse_field(&bound.value, &format!("lower bound of {name}"))?,
                None => Expr::constant(f64::NEG_INFINITY),
            };
            let upper = match upper_bounds.first() {
                Some(bound) => parse_field(&bound.value, &format!("upper bound of {name}"))?,
                None => Expr::constant(f64::INFINITY),
            };
            Ok(ParameterDescriptor::Interval { lower, upper })
        }
    }
}

fn convert_phase(raw: &PhaseRaw) -> Result<PhaseNode, PlotError> {
    // "PP" is a point phase, "IP" an interval; the time shape must agree.
    let declared_point = match raw.kind.as_deref() {
        None => None,
        Some("PP") => Some(true),
        Some("IP") => Some(false),
        Some(other) => {
            return Err(PlotError::InvalidTrace(format!("unknown phase type {other}")));
        }
    };
    let is_point = matches!(raw.time, TimeRaw::Point { .. });
    if declared_point.is_some_and(|declared| declared != is_point) {
        return Err(PlotError::InvalidTrace(format!(
            "phase type {} does not match its time",
            raw.kind.as_deref().unwrap_or_default()
        )));
    }

    let time = match &raw.time {
        TimeRaw::Point { time_point } => PhaseTime::Point {
            time: parse_field(time_point, "time point")?,
        },
        TimeRaw::Interval {
            start_time,
            end_time,
        } => {
            let start = parse_field(start_time, "start time")?;
            let end = match end_time.as_deref() {
                None | Some("Infinity") => Expr::plus(Expr::constant(2.0), start.clone()),
                Some(text) => parse_field(text, "end time")?,
            };
            PhaseTime::Interval { start, end }
        }
    };

    let mut variable_bindings = BTreeMap::new();
    for (name, variable) in &raw.variable_map.0 {
        let Some(value) = variable.unique_value.as_deref() else {
            return Err(PlotError::InvalidTrace(format!(
                "non-unique value for variable {name} is not supported"
            )));
        };
        variable_bindings.insert(
            normalize_symbol(name),
            parse_field(value, &format!("variable {name}"))?,
        );
    }

    let mut parameter_maps = Vec::with_capacity(raw.parameter_maps.len());
    for map_raw in &raw.parameter_maps {
        let mut map = ParameterMap::new();
        for (name, p) in &map_raw.0 {
            map.insert(normalize_symbol(name), convert_parameter(name, p)?);
        }
        parameter_maps.push(map);
    }

    Ok(PhaseNode {
        time,
        variable_bindings,
        parameter_maps,
        status: SimulationStatus::from_raw(&raw.simulation_state),
        children: Vec::new(),
    })
}

// --- Raw (serialized) shape ---

/// Map that keeps the order entries were written in.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V>(pub Vec<(String, V)>);

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        OrderedMap(Vec::new())
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedMapVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    entries.push((key, value));
                }
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRaw {
    pub name: String,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub parameters: OrderedMap<ParameterRaw>,
    pub first_phases: Vec<PhaseRaw>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRaw {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub time: TimeRaw,
    #[serde(default)]
    pub variable_map: OrderedMap<VariableRaw>,
    #[serde(default)]
    pub parameter_maps: Vec<OrderedMap<ParameterRaw>>,
    #[serde(default)]
    pub children: Vec<PhaseRaw>,
    pub simulation_state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeRaw {
    Point {
        time_point: String,
    },
    Interval {
        start_time: String,
        #[serde(default)]
        end_time: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableRaw {
    #[serde(default)]
    pub unique_value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterRaw {
    Point {
        unique_value: String,
    },
    Interval {
        #[serde(default)]
        lower_bounds: Vec<BoundRaw>,
        #[serde(default)]
        upper_bounds: Vec<BoundRaw>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundRaw {
    pub value: String,
}
