//! DCE-MRI conversions and pharmacokinetic fitting.
//!
//! Quantities move along the chain
//!
//! ```text
//! signal → enhancement (%) ⇄ tissue concentration (mM) ⇄ PK parameters
//! ```
//!
//! Conversions between enhancement and concentration assume the fast water
//! exchange limit with a single R10. The full forward model from PK parameters
//! to enhancement ([`pkp_to_enh`]) works per compartment and supports any
//! [`WaterExchangeModel`].
//!
//! Fits are weighted least squares in parameters normalized by the model's
//! typical values, run from every start and reduced with [`minimize_global`].

use log::debug;
use serde::Serialize;

use crate::domain::{PerCompartment, VolumeFractions};
use crate::error::FitError;
use crate::fit::selection::minimize_global;
use crate::math::{LmConfig, LmModel, RootConfig, find_root, optimize};
use crate::models::pk::{PkModel, PkModelKind};
use crate::models::relaxivity::RelaxivityModel;
use crate::models::signal::SignalModel;
use crate::models::water_exchange::WaterExchangeModel;

/// Convert a signal time series to enhancement (%) relative to the mean of
/// the baseline samples at `base_idx`.
pub fn sig_to_enh(signal: &[f64], base_idx: &[usize]) -> Result<Vec<f64>, FitError> {
    if base_idx.is_empty() {
        return Err(FitError::shape("baseline needs at least one time point"));
    }
    if let Some(&bad) = base_idx.iter().find(|&&i| i >= signal.len()) {
        return Err(FitError::shape(format!(
            "baseline index {bad} is out of range for {} time points",
            signal.len()
        )));
    }

    let s_pre = base_idx.iter().map(|&i| signal[i]).sum::<f64>() / base_idx.len() as f64;
    if !(s_pre.is_finite() && s_pre != 0.0) {
        return Err(FitError::domain(format!("baseline signal must be finite and non-zero, got {s_pre}")));
    }

    Ok(signal.iter().map(|s| 100.0 * (s - s_pre) / s_pre).collect())
}

/// Enhancement (%) for tissue concentrations `c_t`, fast exchange limit.
///
/// R20 is taken as 0 and R2* as R2, so only the concentration-induced
/// transverse relaxation attenuates the post-contrast signal.
pub fn conc_to_enh(
    c_t: &[f64],
    k: f64,
    r10: f64,
    relaxivity: &RelaxivityModel,
    signal_model: &SignalModel,
) -> Result<Vec<f64>, FitError> {
    let s_pre = pre_contrast_signal(k, r10, signal_model)?;
    Ok(c_t
        .iter()
        .map(|&c| enhancement_at(c, s_pre, k, r10, relaxivity, signal_model))
        .collect())
}

/// Invert [`conc_to_enh`] point by point.
///
/// Each point is solved from C = 0 to `xtol = 1e-7` within 1000 evaluations;
/// a point that does not converge fails the whole series.
pub fn enh_to_conc(
    enh: &[f64],
    k: f64,
    r10: f64,
    relaxivity: &RelaxivityModel,
    signal_model: &SignalModel,
) -> Result<Vec<f64>, FitError> {
    let s_pre = pre_contrast_signal(k, r10, signal_model)?;
    let config = RootConfig::default();

    enh.iter()
        .enumerate()
        .map(|(idx, &e)| {
            if !e.is_finite() {
                return Err(FitError::domain(format!("enhancement at index {idx} is not finite")));
            }
            find_root(
                |c| Ok(e - enhancement_at(c, s_pre, k, r10, relaxivity, signal_model)),
                0.0,
                &config,
            )
            .map_err(|err| match err {
                FitError::Convergence { iterations, message } => FitError::convergence(
                    iterations,
                    format!("enhancement-to-concentration failed at index {idx}: {message}"),
                ),
                other => other,
            })
        })
        .collect()
}

fn pre_contrast_signal(k: f64, r10: f64, signal_model: &SignalModel) -> Result<f64, FitError> {
    if !(k.is_finite() && k > 0.0) {
        return Err(FitError::domain(format!("B1 factor k must be finite and > 0, got {k}")));
    }
    if !(r10.is_finite() && r10 > 0.0) {
        return Err(FitError::domain(format!("R10 must be finite and > 0, got {r10}")));
    }
    let s_pre = signal_model.r_to_s(1.0, r10, 0.0, k);
    if !(s_pre.is_finite() && s_pre != 0.0) {
        return Err(FitError::domain("pre-contrast signal is zero"));
    }
    Ok(s_pre)
}

fn enhancement_at(
    c: f64,
    s_pre: f64,
    k: f64,
    r10: f64,
    relaxivity: &RelaxivityModel,
    signal_model: &SignalModel,
) -> f64 {
    let r1 = relaxivity.r1(r10, c);
    let r2 = relaxivity.r2(0.0, c);
    let s_post = signal_model.r_to_s(1.0, r1, r2, k);
    100.0 * (s_post - s_pre) / s_pre
}

/// Compartment volume fractions from the PK parameters present in a model.
///
/// - `vb = vp / (1 - hct)`, or 0 without `vp`
/// - with `ve`: `vi = 1 - vb - ve`
/// - without `ve`: the extravascular space is all EES, `ve = 1 - vb`, `vi = 0`
pub fn volume_fractions(vp: Option<f64>, ve: Option<f64>, hct: f64) -> Result<VolumeFractions, FitError> {
    if !(hct.is_finite() && (0.0..1.0).contains(&hct)) {
        return Err(FitError::domain(format!("haematocrit must lie in [0, 1), got {hct}")));
    }
    let vb = vp.map_or(0.0, |vp| vp / (1.0 - hct));
    let (ve, vi) = match ve {
        Some(ve) => (ve, 1.0 - vb - ve),
        None => (1.0 - vb, 0.0),
    };
    Ok(PerCompartment::new(vb, ve, vi))
}

/// Everything needed to predict enhancement from PK parameters.
#[derive(Debug, Clone)]
pub struct EnhancementModel {
    pub pk: PkModel,
    /// Capillary haematocrit.
    pub hct: f64,
    /// B1 correction factor (actual / nominal flip angle).
    pub k: f64,
    /// Pre-contrast tissue R1 (s⁻¹).
    pub r10_tissue: f64,
    /// Pre-contrast capillary blood R1 (s⁻¹), usually the AIF value.
    pub r10_blood: f64,
    pub relaxivity: RelaxivityModel,
    pub water_exchange: WaterExchangeModel,
    pub signal: SignalModel,
}

/// Forward model: enhancement (%) at every time point for `params`.
///
/// Volume fractions double as spin population fractions. The extravascular
/// compartments share an R10 chosen so the population-weighted R10 equals
/// `r10_tissue`. R2 and R2* effects are neglected.
pub fn pkp_to_enh(params: &[f64], model: &EnhancementModel) -> Result<Vec<f64>, FitError> {
    let conc = model.pk.conc(params)?;
    let v = volume_fractions(
        model.pk.param(params, "vp"),
        model.pk.param(params, "ve"),
        model.hct,
    )?;
    if !(v.b >= 0.0 && v.b < 1.0) {
        return Err(FitError::domain(format!("blood volume fraction {} is outside [0, 1)", v.b)));
    }

    let r10_extravascular = (model.r10_tissue - v.b * model.r10_blood) / (1.0 - v.b);
    let r10 = PerCompartment::new(model.r10_blood, r10_extravascular, r10_extravascular);

    let signal_for = |r1: &PerCompartment<f64>| -> f64 {
        model
            .water_exchange
            .r1_components(&v, r1)
            .iter()
            .map(|c| c.population * model.signal.r_to_s(1.0, c.r1, 0.0, model.k))
            .sum()
    };

    let s_pre = signal_for(&r10);
    if !(s_pre.is_finite() && s_pre != 0.0) {
        return Err(FitError::domain(format!("pre-contrast signal is {s_pre}")));
    }

    // An empty compartment holds no tracer.
    let per_volume = |c: f64, v: f64| if v > 0.0 { c / v } else { 0.0 };

    let enh: Vec<f64> = conc
        .plasma
        .iter()
        .zip(conc.ees.iter())
        .map(|(&c_cp, &c_e)| {
            let c = PerCompartment::new(per_volume(c_cp, v.b), per_volume(c_e, v.e), 0.0);
            let r1 = PerCompartment::new(
                model.relaxivity.r1(r10.b, c.b),
                model.relaxivity.r1(r10.e, c.e),
                model.relaxivity.r1(r10.i, c.i),
            );
            100.0 * (signal_for(&r1) - s_pre) / s_pre
        })
        .collect();

    if enh.iter().any(|e| !e.is_finite()) {
        return Err(FitError::domain("predicted enhancement is not finite"));
    }
    Ok(enh)
}

/// Outcome of a PK fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PkFit {
    pub kind: PkModelKind,
    /// Optimal parameters, ordered as [`PkModelKind::param_names`].
    pub params: Vec<f64>,
    /// Best-fit curve at every time point (including zero-weight points).
    pub fitted: Vec<f64>,
    /// Weighted sum of squared residuals.
    pub cost: f64,
}

impl PkFit {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.kind
            .param_names()
            .iter()
            .position(|n| *n == name)
            .and_then(|idx| self.params.get(idx).copied())
    }
}

/// Fit tissue concentrations `c_t` (mM) to PK parameters.
///
/// `starts` defaults to the model's typical values; with several starts the
/// lowest-cost run wins. Zero weights exclude points from the cost.
pub fn conc_to_pkp(
    c_t: &[f64],
    pk_model: &PkModel,
    starts: Option<&[Vec<f64>]>,
    weights: Option<&[f64]>,
    config: &LmConfig,
) -> Result<PkFit, FitError> {
    let forward = |params: &[f64]| pk_model.conc(params).map(|c| c.tissue);
    fit_pk_curve(c_t, pk_model, starts, weights, config, forward)
}

/// Fit enhancement (%) to PK parameters through [`pkp_to_enh`].
pub fn enh_to_pkp(
    enh: &[f64],
    model: &EnhancementModel,
    starts: Option<&[Vec<f64>]>,
    weights: Option<&[f64]>,
    config: &LmConfig,
) -> Result<PkFit, FitError> {
    let forward = |params: &[f64]| pkp_to_enh(params, model);
    fit_pk_curve(enh, &model.pk, starts, weights, config, forward)
}

/// A PK forward model in units of the typical parameter values, clamped to
/// the model bounds.
struct NormalizedPk<'a, F> {
    forward: &'a F,
    pk_model: &'a PkModel,
    scale: Vec<f64>,
}

impl<F> NormalizedPk<'_, F> {
    fn physical(&self, normalized: &[f64]) -> Vec<f64> {
        normalized.iter().zip(self.scale.iter()).map(|(p, s)| p * s).collect()
    }
}

impl<F> LmModel for NormalizedPk<'_, F>
where
    F: Fn(&[f64]) -> Result<Vec<f64>, FitError>,
{
    fn n_params(&self) -> usize {
        self.scale.len()
    }

    fn predict(&self, params: &[f64]) -> Result<Vec<f64>, FitError> {
        (self.forward)(&self.physical(params))
    }

    fn constrain(&self, params: &mut [f64]) {
        let mut physical = self.physical(params);
        self.pk_model.clamp(&mut physical);
        for ((p, v), s) in params.iter_mut().zip(physical).zip(self.scale.iter()) {
            *p = v / s;
        }
    }
}

fn fit_pk_curve<F>(
    observed: &[f64],
    pk_model: &PkModel,
    starts: Option<&[Vec<f64>]>,
    weights: Option<&[f64]>,
    config: &LmConfig,
    forward: F,
) -> Result<PkFit, FitError>
where
    F: Fn(&[f64]) -> Result<Vec<f64>, FitError> + Sync,
{
    let kind = pk_model.kind();
    if observed.len() != pk_model.n_points() {
        return Err(FitError::shape(format!(
            "{} observations for a model with {} time points",
            observed.len(),
            pk_model.n_points()
        )));
    }

    let typical = kind.typical_values();
    let starts: Vec<Vec<f64>> = match starts {
        Some(s) => s.to_vec(),
        None => vec![typical.clone()],
    };
    if let Some(bad) = starts.iter().find(|s| s.len() != kind.param_count()) {
        return Err(FitError::shape(format!(
            "{} start needs {} values ({}), got {}",
            kind.display_name(),
            kind.param_count(),
            kind.param_names().join(", "),
            bad.len()
        )));
    }

    let model = NormalizedPk {
        forward: &forward,
        pk_model,
        scale: typical,
    };
    let normalized_starts: Vec<Vec<f64>> = starts
        .iter()
        .map(|s| s.iter().zip(model.scale.iter()).map(|(p, t)| p / t).collect())
        .collect();

    let best = minimize_global(&normalized_starts, |start| {
        let result = optimize(&model, observed, weights, start, config)?;
        Ok((result.params, result.cost))
    })?;

    let params = model.physical(&best.value);
    let fitted = forward(&params)?;
    debug!(
        "{} fit: start {} won with cost {:.6e}",
        kind.display_name(),
        best.start_index,
        best.cost
    );

    Ok(PkFit {
        kind,
        params,
        fitted,
        cost: best.cost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::aif::Aif;

    fn signal_model(te: f64) -> SignalModel {
        SignalModel::spgr(3.4e-3, 15f64.to_radians(), te).unwrap()
    }

    const RELAXIVITY: RelaxivityModel = RelaxivityModel::Linear { r1: 5.0, r2: 7.1 };

    fn time_grid() -> Vec<f64> {
        (0..61).map(|i| i as f64 * 5.0).collect()
    }

    fn patlak() -> PkModel {
        let aif = Aif::parker(0.42, 30.0).unwrap();
        PkModel::new(PkModelKind::Patlak, time_grid(), &aif).unwrap()
    }

    fn enhancement_model(water_exchange: WaterExchangeModel) -> EnhancementModel {
        EnhancementModel {
            pk: patlak(),
            hct: 0.42,
            k: 1.0,
            r10_tissue: 1.0 / 1.3,
            r10_blood: 1.0 / 1.5,
            relaxivity: RELAXIVITY,
            water_exchange,
            signal: signal_model(0.0),
        }
    }

    fn rel(a: f64, b: f64) -> f64 {
        (a - b).abs() / b.abs()
    }

    #[test]
    fn sig_to_enh_uses_baseline_mean() {
        let enh = sig_to_enh(&[100.0, 102.0, 98.0, 150.0], &[0, 1, 2]).unwrap();
        assert!(enh[0].abs() < 1e-12);
        assert!((enh[3] - 50.0).abs() < 1e-12);
    }

    #[test]
    fn sig_to_enh_of_constant_is_zero() {
        let enh = sig_to_enh(&[7.5; 10], &[0, 1]).unwrap();
        assert!(enh.iter().all(|&e| e == 0.0));
    }

    #[test]
    fn sig_to_enh_rejects_bad_baseline() {
        assert!(matches!(sig_to_enh(&[1.0, 2.0], &[]), Err(FitError::Shape(_))));
        assert!(matches!(sig_to_enh(&[1.0, 2.0], &[5]), Err(FitError::Shape(_))));
        assert!(matches!(sig_to_enh(&[0.0, 2.0], &[0]), Err(FitError::Domain(_))));
    }

    #[test]
    fn conc_enh_round_trip() {
        let concs = [0.0, 0.05, 0.1, 0.5, 1.0, 2.0];
        for te in [0.0, 1.5e-3] {
            let model = signal_model(te);
            let enh = conc_to_enh(&concs, 1.0, 1.0 / 1.3, &RELAXIVITY, &model).unwrap();
            assert_eq!(enh[0], 0.0);
            let back = enh_to_conc(&enh, 1.0, 1.0 / 1.3, &RELAXIVITY, &model).unwrap();
            for (c, b) in concs.iter().zip(back.iter()) {
                assert!((c - b).abs() < 1e-6, "c={c} back={b}");
            }
        }
    }

    #[test]
    fn conc_to_enh_validates_parameters() {
        let model = signal_model(0.0);
        assert!(matches!(
            conc_to_enh(&[0.1], 0.0, 1.0, &RELAXIVITY, &model),
            Err(FitError::Domain(_))
        ));
        assert!(matches!(
            conc_to_enh(&[0.1], 1.0, -1.0, &RELAXIVITY, &model),
            Err(FitError::Domain(_))
        ));
    }

    #[test]
    fn volume_fraction_rules() {
        let v = volume_fractions(Some(0.05), None, 0.5).unwrap();
        assert!((v.b - 0.1).abs() < 1e-12);
        assert!((v.e - 0.9).abs() < 1e-12);
        assert_eq!(v.i, 0.0);

        let v = volume_fractions(Some(0.05), Some(0.3), 0.5).unwrap();
        assert!((v.i - 0.6).abs() < 1e-12);

        let v = volume_fractions(None, None, 0.42).unwrap();
        assert_eq!(v, PerCompartment::new(0.0, 1.0, 0.0));

        assert!(matches!(volume_fractions(Some(0.1), None, 1.0), Err(FitError::Domain(_))));
    }

    #[test]
    fn fxl_forward_model_matches_single_compartment_conversion() {
        let model = enhancement_model(WaterExchangeModel::Fxl);
        let params = [0.05, 0.01];
        let via_compartments = pkp_to_enh(&params, &model).unwrap();
        let c_t = model.pk.conc(&params).unwrap().tissue;
        let direct = conc_to_enh(&c_t, 1.0, model.r10_tissue, &RELAXIVITY, &model.signal).unwrap();
        for (a, b) in via_compartments.iter().zip(direct.iter()) {
            assert!((a - b).abs() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn pkp_to_enh_rejects_blood_filling_the_voxel() {
        let model = enhancement_model(WaterExchangeModel::Fxl);
        assert!(matches!(pkp_to_enh(&[0.6, 0.0], &model), Err(FitError::Domain(_))));
    }

    #[test]
    fn conc_to_pkp_recovers_patlak_parameters() {
        let model = patlak();
        let c_t = model.conc(&[0.05, 0.01]).unwrap().tissue;
        let fit = conc_to_pkp(&c_t, &model, None, None, &LmConfig::default()).unwrap();
        assert!(rel(fit.get("vp").unwrap(), 0.05) < 1e-6);
        assert!(rel(fit.get("ps").unwrap(), 0.01) < 1e-6);
        assert!(fit.cost < 1e-20);
        assert_eq!(fit.fitted.len(), c_t.len());
    }

    #[test]
    fn conc_to_pkp_from_multiple_starts() {
        let model = patlak();
        let c_t = model.conc(&[0.05, 0.01]).unwrap().tissue;
        let starts = vec![vec![0.3, 0.02], vec![0.02, 5e-4], vec![0.1, 1e-3]];
        let fit = conc_to_pkp(&c_t, &model, Some(&starts), None, &LmConfig::default()).unwrap();
        assert!(rel(fit.params[0], 0.05) < 1e-6);
        assert!(rel(fit.params[1], 0.01) < 1e-6);
    }

    #[test]
    fn out_of_bounds_start_is_clamped_into_range() {
        let model = patlak();
        let c_t = model.conc(&[0.05, 0.01]).unwrap().tissue;
        // vp = 5 and ps = -0.03 lie outside the Patlak bounds.
        let starts = vec![vec![5.0, -0.03]];
        let fit = conc_to_pkp(&c_t, &model, Some(&starts), None, &LmConfig::default()).unwrap();
        assert!(rel(fit.params[0], 0.05) < 1e-6);
        assert!(rel(fit.params[1], 0.01) < 1e-6);
    }

    #[test]
    fn zero_weights_exclude_points() {
        let model = patlak();
        let mut c_t = model.conc(&[0.05, 0.01]).unwrap().tissue;
        c_t[10] += 5.0;
        let mut weights = vec![1.0; c_t.len()];
        weights[10] = 0.0;
        let fit = conc_to_pkp(&c_t, &model, None, Some(&weights), &LmConfig::default()).unwrap();
        assert!(rel(fit.params[0], 0.05) < 1e-6);
        assert!(rel(fit.params[1], 0.01) < 1e-6);
        // The excluded point is still predicted from the model.
        assert!((c_t[10] - fit.fitted[10] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn steady_state_vp_fit() {
        let aif = Aif::parker(0.42, 30.0).unwrap();
        let model = PkModel::new(PkModelKind::SteadyStateVp, time_grid(), &aif).unwrap();
        let c_t = model.conc(&[0.07]).unwrap().tissue;
        let fit = conc_to_pkp(&c_t, &model, None, None, &LmConfig::default()).unwrap();
        assert!(rel(fit.params[0], 0.07) < 1e-6);
    }

    #[test]
    fn conc_to_pkp_rejects_mismatched_inputs() {
        let model = patlak();
        let err = conc_to_pkp(&[0.0; 3], &model, None, None, &LmConfig::default()).unwrap_err();
        assert!(matches!(err, FitError::Shape(_)));

        let c_t = model.conc(&[0.05, 0.01]).unwrap().tissue;
        let starts = vec![vec![0.1]];
        let err = conc_to_pkp(&c_t, &model, Some(&starts), None, &LmConfig::default()).unwrap_err();
        assert!(matches!(err, FitError::Shape(_)));
    }

    #[test]
    fn enh_to_pkp_recovers_parameters() {
        for water_exchange in [WaterExchangeModel::Fxl, WaterExchangeModel::Nxl] {
            let model = enhancement_model(water_exchange);
            let enh = pkp_to_enh(&[0.05, 0.01], &model).unwrap();
            let fit = enh_to_pkp(&enh, &model, None, None, &LmConfig::default()).unwrap();
            assert!(rel(fit.params[0], 0.05) < 1e-5, "{water_exchange:?}: {:?}", fit.params);
            assert!(rel(fit.params[1], 0.01) < 1e-5, "{water_exchange:?}: {:?}", fit.params);
        }
    }
}
