//! Simulation context: time, discrete state, parameters, inputs and cache.
//!
//! Every mutation bumps the version of what it touched, which is how cache
//! entries notice they are stale.

use std::fmt;
use std::rc::Rc;

use nalgebra::{DVector, DVectorView};
use sim_types::{Result, SimError};

use crate::cache::{Cache, SourceVersions};

/// Upstream system producing generalized actuation from the context.
///
/// Implementations may read anything the context exposes, including
/// outputs of the manager that owns the context. Reading an output that
/// itself depends on actuation is an algebraic loop and fails.
pub trait ActuationSource: fmt::Debug {
    /// Generalized actuation forces, one per velocity.
    fn eval_actuation(&self, context: &Context) -> Result<DVector<f64>>;
}

/// How generalized actuation is supplied.
#[derive(Debug, Clone, Default)]
pub enum Actuation {
    /// No actuation.
    #[default]
    None,
    /// A fixed vector.
    Fixed(DVector<f64>),
    /// Evaluated by an upstream system.
    Source(Rc<dyn ActuationSource>),
}

/// State and parameters of one simulation, plus its cache.
pub struct Context {
    time: f64,
    /// `[q; v]`.
    state: DVector<f64>,
    num_positions: usize,
    joint_damping: DVector<f64>,
    reflected_inertia: DVector<f64>,
    actuation: Actuation,
    versions: SourceVersions,
    cache: Cache,
    /// Revision of the manager that created this context.
    revision: u64,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("time", &self.time)
            .field("state", &self.state.as_slice())
            .field("versions", &self.versions)
            .finish_non_exhaustive()
    }
}

impl Clone for Context {
    /// Copies state and parameters; the clone starts with an empty cache.
    fn clone(&self) -> Self {
        Self {
            time: self.time,
            state: self.state.clone(),
            num_positions: self.num_positions,
            joint_damping: self.joint_damping.clone(),
            reflected_inertia: self.reflected_inertia.clone(),
            actuation: self.actuation.clone(),
            versions: self.versions,
            cache: self.cache.empty_like(),
            revision: self.revision,
        }
    }
}

impl Context {
    pub(crate) fn new(
        positions: DVector<f64>,
        velocities: DVector<f64>,
        joint_damping: DVector<f64>,
        reflected_inertia: DVector<f64>,
        cache: Cache,
        revision: u64,
    ) -> Self {
        let num_positions = positions.len();
        let mut state = DVector::zeros(num_positions + velocities.len());
        state.rows_mut(0, num_positions).copy_from(&positions);
        state
            .rows_mut(num_positions, velocities.len())
            .copy_from(&velocities);
        Self {
            time: 0.0,
            state,
            num_positions,
            joint_damping,
            reflected_inertia,
            actuation: Actuation::None,
            versions: SourceVersions::default(),
            cache,
            revision,
        }
    }

    /// Simulation time.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Set the simulation time.
    pub fn set_time(&mut self, time: f64) {
        self.time = time;
        self.versions.time += 1;
    }

    /// Number of generalized positions.
    pub fn num_positions(&self) -> usize {
        self.num_positions
    }

    /// Number of generalized velocities.
    pub fn num_velocities(&self) -> usize {
        self.state.len() - self.num_positions
    }

    /// Discrete state `[q; v]`.
    pub fn discrete_state(&self) -> &DVector<f64> {
        &self.state
    }

    /// Generalized positions.
    pub fn positions(&self) -> DVectorView<'_, f64> {
        self.state.rows(0, self.num_positions)
    }

    /// Generalized velocities.
    pub fn velocities(&self) -> DVectorView<'_, f64> {
        self.state.rows(self.num_positions, self.num_velocities())
    }

    /// Replace the whole discrete state.
    pub fn set_discrete_state(&mut self, state: DVector<f64>) -> Result<()> {
        check_size("discrete state", self.state.len(), state.len())?;
        self.state = state;
        self.versions.discrete_state += 1;
        Ok(())
    }

    /// Set the generalized positions.
    pub fn set_positions(&mut self, q: &DVector<f64>) -> Result<()> {
        check_size("positions", self.num_positions, q.len())?;
        self.state.rows_mut(0, self.num_positions).copy_from(q);
        self.versions.discrete_state += 1;
        Ok(())
    }

    /// Set the generalized velocities.
    pub fn set_velocities(&mut self, v: &DVector<f64>) -> Result<()> {
        let nv = self.num_velocities();
        check_size("velocities", nv, v.len())?;
        self.state.rows_mut(self.num_positions, nv).copy_from(v);
        self.versions.discrete_state += 1;
        Ok(())
    }

    /// Per-dof joint damping.
    pub fn joint_damping(&self) -> &DVector<f64> {
        &self.joint_damping
    }

    /// Set per-dof joint damping. Entries must be non-negative.
    pub fn set_joint_damping(&mut self, damping: DVector<f64>) -> Result<()> {
        check_size("joint damping", self.num_velocities(), damping.len())?;
        check_non_negative("joint damping", &damping)?;
        self.joint_damping = damping;
        self.versions.parameters += 1;
        Ok(())
    }

    /// Per-dof reflected rotor inertia.
    pub fn reflected_inertia(&self) -> &DVector<f64> {
        &self.reflected_inertia
    }

    /// Set per-dof reflected inertia. Entries must be non-negative.
    pub fn set_reflected_inertia(&mut self, reflected_inertia: DVector<f64>) -> Result<()> {
        check_size("reflected inertia", self.num_velocities(), reflected_inertia.len())?;
        check_non_negative("reflected inertia", &reflected_inertia)?;
        self.reflected_inertia = reflected_inertia;
        self.versions.parameters += 1;
        Ok(())
    }

    /// How actuation is supplied.
    pub fn actuation(&self) -> &Actuation {
        &self.actuation
    }

    /// Fix generalized actuation to a constant vector.
    pub fn fix_actuation(&mut self, tau: DVector<f64>) -> Result<()> {
        check_size("actuation", self.num_velocities(), tau.len())?;
        self.actuation = Actuation::Fixed(tau);
        self.versions.inputs += 1;
        Ok(())
    }

    /// Connect an upstream actuation source.
    pub fn connect_actuation(&mut self, source: Rc<dyn ActuationSource>) {
        self.actuation = Actuation::Source(source);
        self.versions.inputs += 1;
    }

    /// Remove any actuation.
    pub fn clear_actuation(&mut self) {
        self.actuation = Actuation::None;
        self.versions.inputs += 1;
    }

    /// Generalized actuation, zero when none is connected.
    pub fn eval_actuation(&self) -> Result<DVector<f64>> {
        let tau = match &self.actuation {
            Actuation::None => return Ok(DVector::zeros(self.num_velocities())),
            Actuation::Fixed(tau) => tau.clone(),
            Actuation::Source(source) => source.eval_actuation(self)?,
        };
        check_size("actuation", self.num_velocities(), tau.len())?;
        Ok(tau)
    }

    /// Current versions of time, state, parameters and inputs.
    pub fn versions(&self) -> &SourceVersions {
        &self.versions
    }

    /// Cached per-step quantities.
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub(crate) fn revision(&self) -> u64 {
        self.revision
    }

    /// Replace state and time at once after a successful step.
    pub(crate) fn commit_step(&mut self, time: f64, state: DVector<f64>) -> Result<()> {
        self.set_discrete_state(state)?;
        self.set_time(time);
        Ok(())
    }
}

fn check_size(what: &str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(SimError::dimension_mismatch(what, expected, actual))
    }
}

fn check_non_negative(what: &str, x: &DVector<f64>) -> Result<()> {
    if let Some(bad) = x.iter().find(|d| !(**d >= 0.0)) {
        return Err(SimError::invalid_config(format!(
            "{what} must be non-negative, got {bad}"
        )));
    }
    Ok(())
}
