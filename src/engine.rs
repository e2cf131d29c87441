//! The per-turn entry point composing the axis update, the weight
//! scheduler, and phase fusion.
//!
//! [`Engine::process_turn`] does no I/O of its own. Persisting the new
//! state (see [`crate::store::PersonaStateStore`]) and consulting the
//! style-profile cache for the fused result (see
//! [`crate::cache::StyleProfileCache`]) are the caller's
//! responsibility.

use crate::delta::Delta;
use crate::phase::catalog::{EngineParams, PersonaDefinition};
use crate::phase::fusion::{fuse_phase_config, FusedPhase};
use crate::phase::scheduler::{update_phase_weights, NoiseSource, UniformNoise};
use crate::state::{update_axes, PersonaState};

/// The affect-state engine: defaults plus the injected noise source.
///
/// Synchronous and single-threaded per invocation; one instance per
/// worker is the expected shape.
pub struct Engine {
    params: EngineParams,
    noise: Box<dyn NoiseSource>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine with default parameters and production randomness.
    pub fn new() -> Self {
        Self::with_noise(EngineParams::default(), Box::new(UniformNoise))
    }

    /// Engine with custom default parameters.
    pub fn with_params(params: EngineParams) -> Self {
        Self::with_noise(params, Box::new(UniformNoise))
    }

    /// Engine with custom parameters and an injected noise source.
    pub fn with_noise(params: EngineParams, noise: Box<dyn NoiseSource>) -> Self {
        Self { params, noise }
    }

    /// The engine-level default parameters (before persona overrides).
    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    /// Advance one persona by one turn.
    ///
    /// Applies the EMA axis update, reschedules the phase weights, and
    /// fuses the result, all under the persona's resolved dynamics. A
    /// persona without phases passes its weight fields through
    /// untouched and fuses to the empty descriptor.
    pub fn process_turn(
        &mut self,
        persona: &PersonaDefinition,
        prior: &PersonaState,
        delta: &Delta,
    ) -> (PersonaState, FusedPhase) {
        let params = persona.dynamics.resolve(&self.params);

        let mut next = update_axes(prior, delta, params.alpha);

        if !persona.catalog.is_empty() {
            let update = update_phase_weights(
                &persona.catalog,
                &prior.phase_weights,
                delta,
                &params,
                self.noise.as_mut(),
            );
            next.phase_weights = update.weights;
            next.dominant_phase = update.dominant_phase;
        }

        let fused = fuse_phase_config(&persona.catalog, &next.phase_weights);
        (next, fused)
    }
}

// ============================================================================
// Tests
// ============================================================================
