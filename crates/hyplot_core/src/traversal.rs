//! Resumable depth-first traversal of the phase tree.
//!
//! The walk is an explicit state machine: a stack of `(phase, child cursor)`
//! frames plus the points accumulated since the last leaf and the index of
//! the parameter condition being plotted. `resume` runs until the wall-clock
//! budget is spent, then returns `Yielded` with all state kept in the
//! engine, ready for the next display frame.

use crate::error::{PlotError, Result};
use crate::geometry::SampledPoint;
use crate::parameter::{matches_condition, ParameterCondition};
use crate::sampler::{sample_phase, AxisTriplet};
use crate::settings::PlotSettings;
use crate::trace::{PhaseId, PhaseTree};
use crate::traits::Clock;
use log::{debug, info, warn};
use nalgebra::Point3;
use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalState {
    Idle,
    Running,
    Completed,
    Interrupted,
    Failed,
}

/// Result of one `resume` burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Budget exhausted; call `resume` again on the next frame.
    Yielded,
    Completed,
    Interrupted,
}

/// One level of the depth-first walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub phase: PhaseId,
    /// Next child of `phase` to examine.
    pub cursor: usize,
}

/// Shared "replot requested" flag, checked before every traversal step.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraversalConfig {
    /// Maximum step of the static polyline samples.
    pub coarse_step: f64,
    /// Maximum step of the animation track samples.
    pub fine_step: f64,
    pub tolerance: f64,
    pub yield_threshold_ms: f64,
}

impl From<&PlotSettings> for TraversalConfig {
    fn from(settings: &PlotSettings) -> Self {
        Self {
            coarse_step: settings.plot_interval,
            fine_step: settings.animation_step,
            tolerance: settings.containment_tolerance,
            yield_threshold_ms: settings.yield_threshold_ms,
        }
    }
}

/// Points gathered between the previous leaf and the leaf just reached.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedLeaf {
    pub condition_index: usize,
    pub leaf: PhaseId,
    /// Coarse samples for the static polyline.
    pub points: Vec<SampledPoint>,
    /// Fine samples for the animation track.
    pub samples: Vec<Point3<f64>>,
}

pub struct TraversalEngine {
    tree: Rc<PhaseTree>,
    axes: AxisTriplet,
    conditions: Vec<ParameterCondition>,
    config: TraversalConfig,
    cancel: CancelToken,
    state: TraversalState,
    stack: Vec<Frame>,
    root_index: usize,
    condition_index: usize,
    coarse: Vec<SampledPoint>,
    fine: Vec<Point3<f64>>,
    last_yield_ms: f64,
}

impl TraversalEngine {
    pub fn new(
        tree: Rc<PhaseTree>,
        axes: AxisTriplet,
        conditions: Vec<ParameterCondition>,
        config: TraversalConfig,
        cancel: CancelToken,
    ) -> Self {
        Self {
            tree,
            axes,
            conditions,
            config,
            cancel,
            state: TraversalState::Idle,
            stack: Vec::new(),
            root_index: 0,
            condition_index: 0,
            coarse: Vec::new(),
            fine: Vec::new(),
            last_yield_ms: 0.0,
        }
    }

    pub fn state(&self) -> TraversalState {
        self.state
    }

    pub fn stack(&self) -> &[Frame] {
        &self.stack
    }

    pub fn condition_index(&self) -> usize {
        self.condition_index
    }

    pub fn conditions(&self) -> &[ParameterCondition] {
        &self.conditions
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            TraversalState::Completed | TraversalState::Interrupted | TraversalState::Failed
        )
    }

    /// Runs the traversal until it yields, completes, is interrupted or fails.
    ///
    /// Every leaf reached hands its accumulated points to `on_leaf`. On error
    /// the engine moves to `Failed` and drops all partial state.
    pub fn resume(
        &mut self,
        clock: &dyn Clock,
        on_leaf: &mut dyn FnMut(CompletedLeaf),
    ) -> Result<StepOutcome> {
        match self.state {
            TraversalState::Completed => return Ok(StepOutcome::Completed),
            TraversalState::Interrupted => return Ok(StepOutcome::Interrupted),
            TraversalState::Failed => {
                return Err(PlotError::Evaluation(
                    "traversal already failed".to_string(),
                ))
            }
            TraversalState::Idle | TraversalState::Running => {}
        }

        match self.run(clock, on_leaf) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.discard(TraversalState::Failed);
                Err(err)
            }
        }
    }

    /// Stops the traversal and drops its continuation.
    pub fn interrupt(&mut self) {
        if !self.is_finished() {
            self.discard(TraversalState::Interrupted);
        }
    }

    fn run(
        &mut self,
        clock: &dyn Clock,
        on_leaf: &mut dyn FnMut(CompletedLeaf),
    ) -> Result<StepOutcome> {
        if self.state == TraversalState::Idle {
            self.state = TraversalState::Running;
            self.last_yield_ms = clock.now_ms();
            info!(
                "Traversal started: {} condition(s), {} phase(s)",
                self.conditions.len(),
                self.tree.len()
            );
            if !self.enter_root()? {
                return Ok(self.complete());
            }
        }

        let tree = Rc::clone(&self.tree);
        loop {
            if self.cancel.is_cancelled() {
                warn!("Plot is interrupted");
                self.discard(TraversalState::Interrupted);
                return Ok(StepOutcome::Interrupted);
            }

            let Some(&top) = self.stack.last() else {
                return Err(PlotError::Evaluation(
                    "traversal stack is empty while running".to_string(),
                ));
            };
            let phase = tree.node(top.phase);
            let condition = &self.conditions[self.condition_index];

            self.coarse
                .extend(sample_phase(phase, condition, &self.axes, self.config.coarse_step)?);
            self.fine.extend(
                sample_phase(phase, condition, &self.axes, self.config.fine_step)?
                    .into_iter()
                    .map(|p| p.position),
            );

            if phase.is_leaf() {
                on_leaf(CompletedLeaf {
                    condition_index: self.condition_index,
                    leaf: top.phase,
                    points: std::mem::take(&mut self.coarse),
                    samples: std::mem::take(&mut self.fine),
                });
                self.stack.pop();
                match self.stack.last_mut() {
                    Some(parent) => parent.cursor += 1,
                    None => {
                        // A root that is itself a leaf.
                        self.root_index += 1;
                        if !self.enter_root()? {
                            return Ok(self.complete());
                        }
                        continue;
                    }
                }
            }

            // Find the next child to visit, climbing back up as branches run out.
            loop {
                let condition = &self.conditions[self.condition_index];
                let Some(top) = self.stack.last_mut() else {
                    return Err(PlotError::Evaluation(
                        "traversal stack is empty while searching".to_string(),
                    ));
                };
                let children = &tree.node(top.phase).children;
                let mut found = None;
                while top.cursor < children.len() {
                    let child = children[top.cursor];
                    if matches_condition(
                        &tree.node(child).parameter_maps,
                        condition,
                        self.config.tolerance,
                    )? {
                        found = Some(child);
                        break;
                    }
                    top.cursor += 1;
                }

                if let Some(child) = found {
                    self.stack.push(Frame {
                        phase: child,
                        cursor: 0,
                    });
                    let now = clock.now_ms();
                    if now - self.last_yield_ms >= self.config.yield_threshold_ms {
                        self.last_yield_ms = now;
                        debug!(
                            "Traversal yielding at depth {} (condition {})",
                            self.stack.len(),
                            self.condition_index
                        );
                        return Ok(StepOutcome::Yielded);
                    }
                    break;
                }

                if self.stack.len() > 1 {
                    self.stack.pop();
                    if let Some(parent) = self.stack.last_mut() {
                        parent.cursor += 1;
                    }
                    continue;
                }

                // Root exhausted for this condition.
                self.root_index += 1;
                if !self.enter_root()? {
                    return Ok(self.complete());
                }
                break;
            }
        }
    }

    /// Resets the stack to the next root that applies, moving on to the next
    /// parameter condition when the roots run out. Returns false once every
    /// condition has been walked.
    fn enter_root(&mut self) -> Result<bool> {
        self.stack.clear();
        // Samples of a walk that reached no leaf are never drawn.
        self.coarse.clear();
        self.fine.clear();
        let roots = self.tree.roots();
        while self.condition_index < self.conditions.len() {
            let condition = &self.conditions[self.condition_index];
            while self.root_index < roots.len() {
                let root = roots[self.root_index];
                let maps = &self.tree.node(root).parameter_maps;
                if maps.is_empty() || matches_condition(maps, condition, self.config.tolerance)? {
                    self.stack.push(Frame {
                        phase: root,
                        cursor: 0,
                    });
                    return Ok(true);
                }
                self.root_index += 1;
            }
            self.condition_index += 1;
            self.root_index = 0;
            if self.condition_index < self.conditions.len() {
                debug!("Traversal moving to condition {}", self.condition_index);
            }
        }
        Ok(false)
    }

    fn complete(&mut self) -> StepOutcome {
        info!("Traversal completed");
        self.discard(TraversalState::Completed);
        StepOutcome::Completed
    }

    fn discard(&mut self, state: TraversalState) {
        self.state = state;
        self.stack.clear();
        self.coarse.clear();
        self.fine.clear();
    }
}
