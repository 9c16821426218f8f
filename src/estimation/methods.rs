use tracing::trace;

use crate::error::GrowthError;
use crate::estimation::reconcile::quad_mean_diameter;
use crate::model::{Bank, BecZone, Region, UtilizationClass, UtilizationVector};
use crate::tables::{ControlData, EMPIRICAL_OCCUPANCY};

/// Largest logit argument accepted before `exp` would overflow single
/// precision.
const MAX_LOGIT: f32 = 88.0;

pub(crate) fn safe_exponent(logit: f32) -> Result<f32, GrowthError> {
    if logit > MAX_LOGIT {
        return Err(GrowthError::LogitOverflow(logit));
    }
    Ok(logit.exp())
}

pub(crate) fn exponent_ratio(logit: f32) -> Result<f32, GrowthError> {
    let e = safe_exponent(logit)?;
    Ok(e / (1.0 + e))
}

/// Logistic of `arg`, saturated to exactly 0 / 1 outside +-radix.
pub(crate) fn ratio(arg: f32, radix: f32) -> f32 {
    if arg < -radix {
        0.0
    } else if arg > radix {
        1.0
    } else {
        let e = arg.exp();
        e / (1.0 + e)
    }
}

/// Sum of the four size bands.
fn sum_components(components: &UtilizationVector) -> f32 {
    components.band_sum()
}

/// Sum the size bands into the All slot.
fn store_sum_components(components: &mut UtilizationVector) -> f32 {
    let sum = sum_components(components);
    components.set_all(sum);
    sum
}

/// Rescale the size bands so they sum exactly to the already-known All value.
fn normalize_components(components: &mut UtilizationVector) -> Result<f32, GrowthError> {
    let sum = sum_components(components);
    if sum <= 0.0 {
        return Err(GrowthError::processing(format!(
            "Total volume {sum} was not positive"
        )));
    }
    let k = components.all() / sum;
    for uc in UtilizationClass::UTIL_CLASSES {
        components.set(uc, components.get(uc) * k);
    }
    Ok(k)
}

/// Drive an estimator over the size bands: bands failing `skip` get
/// `default_value`; otherwise, when `target` is All or matches the band, the
/// processor maps the input value to the output value.
fn estimate_utilization<F>(
    input: &UtilizationVector,
    output: &mut UtilizationVector,
    target: UtilizationClass,
    mut processor: F,
    skip: fn(f32) -> bool,
    default_value: f32,
) -> Result<(), GrowthError>
where
    F: FnMut(UtilizationClass, f32) -> Result<f32, GrowthError>,
{
    for uc in UtilizationClass::UTIL_CLASSES {
        let input_value = input.get(uc);
        if skip(input_value) {
            output.set(uc, default_value);
            continue;
        }
        if target != UtilizationClass::All && target != uc {
            continue;
        }
        output.set(uc, processor(uc, input_value)?);
    }
    Ok(())
}

fn never_skip(_: f32) -> bool {
    false
}

fn height_multiplier(
    tables: &ControlData,
    genus: &str,
    region: Region,
    trees_per_hectare_primary: f32,
) -> Result<f32, GrowthError> {
    let coe = tables.primary_height_coe(genus, region)?;
    let a0 = coe.coe(1);
    let a1 = coe.coe(2);
    let a2 = coe.coe(3);
    Ok(a0 - a1 + a1 * (a2 * (trees_per_hectare_primary - 100.0)).exp())
}

/// EMP050 method 1: lorey height of the primary species from the dominant
/// height of the lead species.
pub fn primary_height_from_lead_height(
    tables: &ControlData,
    lead_height: f32,
    genus: &str,
    region: Region,
    trees_per_hectare_primary: f32,
) -> Result<f32, GrowthError> {
    let mult = height_multiplier(tables, genus, region, trees_per_hectare_primary)?;
    Ok(1.3 + (lead_height - 1.3) * mult)
}

/// EMP050 method 2: dominant height of the lead species from the lorey
/// height of the primary species.
pub fn lead_height_from_primary_height(
    tables: &ControlData,
    primary_height: f32,
    genus: &str,
    region: Region,
    trees_per_hectare_primary: f32,
) -> Result<f32, GrowthError> {
    let mult = height_multiplier(tables, genus, region, trees_per_hectare_primary)?;
    Ok(1.3 + (primary_height - 1.3) / mult)
}

/// EMP051: initial estimate of the primary species lorey height from the
/// lead height, used before a stem density is known.
pub fn primary_height_from_lead_height_initial(
    tables: &ControlData,
    lead_height: f32,
    genus: &str,
    region: Region,
) -> Result<f32, GrowthError> {
    let coe = tables.primary_height_initial_coe(genus, region)?;
    Ok(1.3 + coe.coe(1) * (lead_height - 1.3).powf(coe.coe(2)))
}

/// EMP053: lorey height of a non-primary species of the primary layer.
pub fn non_primary_lorey_height(
    tables: &ControlData,
    genus: &str,
    primary_genus: &str,
    region: Region,
    lead_height: f32,
    primary_height: f32,
) -> Result<f32, GrowthError> {
    let coe = tables.non_primary_height_coe(genus, primary_genus, region)?;
    let height = if coe.equation_index == 1 {
        lead_height
    } else {
        primary_height
    };
    Ok(1.3 + coe.coe.coe(1) * (height - 1.3).powf(coe.coe.coe(2)))
}

/// Height and diameter limits of one species component (EMP061).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeLimits {
    pub max_lorey_height: f32,
    pub max_quad_mean_diameter: f32,
    pub min_diameter_height: f32,
    pub max_diameter_height: f32,
}

/// EMP061: component size limits for a genus and region.
pub fn size_limits(tables: &ControlData, genus: &str, region: Region) -> Result<SizeLimits, GrowthError> {
    let coe = tables.size_limits_coe(genus, region)?;
    Ok(SizeLimits {
        max_lorey_height: coe.coe(1),
        max_quad_mean_diameter: coe.coe(2),
        min_diameter_height: coe.coe(3),
        max_diameter_height: coe.coe(4),
    })
}

/// EMP060: quadratic mean diameter of one species within a stand, from the
/// stand totals and the species' share of them. Enforces the EMP061 limits.
#[allow(clippy::too_many_arguments)]
pub fn quad_mean_diameter_for_species(
    tables: &ControlData,
    bank: &Bank,
    species: usize,
    region: Region,
    stand_quad_mean_diameter: f32,
    stand_basal_area: f32,
    stand_trees_per_hectare: f32,
    stand_lorey_height: f32,
) -> Result<f32, GrowthError> {
    let genus = &bank.genera[species];
    let fraction = bank.fractions[species];

    let c = 0.00441786467f32;
    let min_quad_mean_diameter = 7.6f32.min(stand_quad_mean_diameter);

    if fraction >= 1.0 || stand_quad_mean_diameter < min_quad_mean_diameter {
        return Ok(stand_quad_mean_diameter);
    }

    let fraction_other = 1.0 - fraction;

    let target_coe = tables.by_species_dq_coe(genus)?;
    let a2 = target_coe.coe(2);
    let mut a0 = target_coe.coe(0);
    let mut a1 = target_coe.coe(1);

    for i in bank.indices() {
        if i == species || bank.fractions[i] <= 0.0 {
            continue;
        }
        let coe_i = tables.by_species_dq_coe(&bank.genera[i])?;
        let mult = -bank.fractions[i] / fraction_other;
        a0 += mult * coe_i.coe(0);
        a1 -= mult * coe_i.coe(1);
    }

    let lorey_height_spec = bank.lorey_heights[species].all();
    let lorey_height_1 = 4.0f32.max(lorey_height_spec);
    let lorey_height_2 = (stand_lorey_height - lorey_height_spec * fraction) / fraction_other;
    let lorey_height_ratio = ((lorey_height_1 - 3.0) / (lorey_height_2 - 3.0)).clamp(0.05, 20.0);

    let r = (a0 + a1 * lorey_height_ratio.ln() + a2 * stand_quad_mean_diameter.ln()).exp();

    let base_area_1 = fraction * stand_basal_area;
    let base_area_2 = stand_basal_area - base_area_1;

    let trees_per_hectare_1;
    if (r - 1.0).abs() < 0.0005 {
        trees_per_hectare_1 = fraction * stand_trees_per_hectare;
    } else {
        let aa = (r - 1.0) * c;
        let bb = c * (1.0 - r) * stand_trees_per_hectare + base_area_1 + base_area_2 * r;
        let cc = -base_area_1 * stand_trees_per_hectare;
        let term = bb * bb - 4.0 * aa * cc;
        if term <= 0.0 {
            return Err(GrowthError::processing(format!(
                "Term for trees per hectare calculation when estimating quadratic mean diameter \
                 for species {genus} was {term} but should be positive"
            )));
        }
        trees_per_hectare_1 = (-bb + term.sqrt()) / (2.0 * aa);
        if trees_per_hectare_1 <= 0.0 || trees_per_hectare_1 > stand_trees_per_hectare {
            return Err(GrowthError::processing(format!(
                "Trees per hectare for species {genus} was {trees_per_hectare_1} but should be \
                 positive and at most the stand total {stand_trees_per_hectare}"
            )));
        }
    }

    let quad_mean_diameter_1 = quad_mean_diameter(base_area_1, trees_per_hectare_1);
    let trees_per_hectare_2 = stand_trees_per_hectare - trees_per_hectare_1;
    let quad_mean_diameter_2 = quad_mean_diameter(base_area_2, trees_per_hectare_2);

    let limits = size_limits(tables, genus, region)?;

    Ok(clamp_species_quad_mean_diameter(
        limits,
        stand_trees_per_hectare,
        min_quad_mean_diameter,
        lorey_height_spec,
        base_area_1,
        base_area_2,
        quad_mean_diameter_1,
        quad_mean_diameter_2,
    ))
}

/// Apply the EMP061 limits to a species/remainder split, shifting density
/// between the two components when either diameter leaves its allowed range.
#[allow(clippy::too_many_arguments)]
fn clamp_species_quad_mean_diameter(
    limits: SizeLimits,
    stand_trees_per_hectare: f32,
    min_quad_mean_diameter: f32,
    lorey_height_spec: f32,
    base_area_1: f32,
    base_area_2: f32,
    mut quad_mean_diameter_1: f32,
    mut quad_mean_diameter_2: f32,
) -> f32 {
    use crate::estimation::reconcile::trees_per_hectare as tph_of;

    if quad_mean_diameter_2 < min_quad_mean_diameter {
        // The remainder is too small; shrink the target species instead.
        quad_mean_diameter_2 = min_quad_mean_diameter;
        let tph_2 = tph_of(base_area_2, quad_mean_diameter_2);
        let tph_1 = stand_trees_per_hectare - tph_2;
        quad_mean_diameter_1 = quad_mean_diameter(base_area_1, tph_1);
    }

    let dq_min_sp = min_quad_mean_diameter.max(limits.min_diameter_height * lorey_height_spec);
    let dq_max_sp = 7.6f32.max(
        limits
            .max_quad_mean_diameter
            .min(limits.max_diameter_height * lorey_height_spec),
    );

    if quad_mean_diameter_1 < dq_min_sp {
        quad_mean_diameter_1 = dq_min_sp;
        let tph_1 = tph_of(base_area_1, quad_mean_diameter_1);
        let tph_2 = stand_trees_per_hectare - tph_1;
        quad_mean_diameter_2 = quad_mean_diameter(base_area_2, tph_2);
    }

    if quad_mean_diameter_1 > dq_max_sp {
        // The target species is too big; cap it and push density back into
        // the remainder.
        quad_mean_diameter_1 = dq_max_sp;
        let tph_1 = tph_of(base_area_1, quad_mean_diameter_1);
        let tph_2 = stand_trees_per_hectare - tph_1;

        if tph_2 > 0.0 && base_area_2 > 0.0 {
            quad_mean_diameter_2 = quad_mean_diameter(base_area_2, tph_2);
        } else {
            quad_mean_diameter_2 = 1000.0;
        }

        // Under rare circumstances let the target exceed its maximum rather
        // than leave the remainder below the floor.
        if quad_mean_diameter_2 < min_quad_mean_diameter {
            quad_mean_diameter_2 = min_quad_mean_diameter;
            let tph_2 = tph_of(base_area_2, quad_mean_diameter_2);
            let tph_1 = stand_trees_per_hectare - tph_2;
            quad_mean_diameter_1 = quad_mean_diameter(base_area_1, tph_1);
        }
    }

    quad_mean_diameter_1
}

/// EMP070: decompose All-class basal area into the four size bands.
///
/// Bands are chained outward from the All total: each band's cumulative value
/// is a logistic fraction of the previous one, with the first band capped
/// when the stand diameter is below 12.5 cm.
pub fn basal_area_by_utilization(
    tables: &ControlData,
    bec: &BecZone,
    quad_mean_diameter_util: &UtilizationVector,
    basal_area_util: &mut UtilizationVector,
    genus: &str,
) -> Result<(), GrowthError> {
    let dq = quad_mean_diameter_util.all();
    let mut b = UtilizationVector::new();
    b.set_all(basal_area_util.all());

    for uc in UtilizationClass::BANDS_BUT_LARGEST {
        let coe = tables.util_comp_ba_coe(uc.index(), genus, bec.growth_alias())?;
        let a0 = coe.coe(1);
        let a1 = coe.coe(2);

        let logit = if uc == UtilizationClass::U75To125 {
            a0 + a1 * dq.powf(0.25)
        } else {
            a0 + a1 * dq
        };

        let previous = b.get(uc.previous().unwrap_or(UtilizationClass::All));
        b.set(uc, previous * exponent_ratio(logit)?);

        if uc == UtilizationClass::U75To125 && dq < 12.5 {
            let dq1 = quad_mean_diameter_util.get(UtilizationClass::U75To125);
            let ba12_max = (1.0 - ((dq1 - 7.4) / (dq - 7.4)).powf(2.0)) * b.all();
            let capped = b.get(uc).min(ba12_max);
            b.set(uc, capped);
        }
    }

    basal_area_util.set(
        UtilizationClass::U75To125,
        basal_area_util.all() - b.get(UtilizationClass::U75To125),
    );
    basal_area_util.set(
        UtilizationClass::U125To175,
        b.get(UtilizationClass::U75To125) - b.get(UtilizationClass::U125To175),
    );
    basal_area_util.set(
        UtilizationClass::U175To225,
        b.get(UtilizationClass::U125To175) - b.get(UtilizationClass::U175To225),
    );
    basal_area_util.set(UtilizationClass::Over225, b.get(UtilizationClass::U175To225));

    Ok(())
}

/// EMP071: estimate the quadratic mean diameter of each size band from the
/// All-class diameter.
pub fn quad_mean_diameter_by_utilization(
    tables: &ControlData,
    bec: &BecZone,
    quad_mean_diameter_util: &mut UtilizationVector,
    genus: &str,
) -> Result<(), GrowthError> {
    trace!(
        genus,
        bec = %bec.alias,
        dq_all = quad_mean_diameter_util.all(),
        "estimating diameter by utilization class"
    );

    let dq07 = quad_mean_diameter_util.all();

    for uc in UtilizationClass::UTIL_CLASSES {
        let coe = tables.util_comp_dq_coe(uc.index(), genus, bec.growth_alias())?;
        let a0 = coe.coe(1);
        let a1 = coe.coe(2);
        let a2 = coe.coe(3);

        match uc {
            UtilizationClass::U75To125 => {
                if dq07 < 7.5001 {
                    quad_mean_diameter_util.set(uc, 7.5);
                } else {
                    let logit = a1 / a0 * (dq07 - 7.5);
                    let value = 7.5 + a0 * (1.0 - safe_exponent(logit)?).powf(a2);
                    quad_mean_diameter_util.set(uc, value.min(dq07));
                }
            }
            UtilizationClass::U125To175 | UtilizationClass::U175To225 => {
                let logit = a0 + a1 * (dq07 / 7.5).powf(a2);
                quad_mean_diameter_util.set(uc, uc.low_bound() + 5.0 * exponent_ratio(logit)?);
            }
            UtilizationClass::Over225 => {
                let a3 = coe.coe(4);
                let logit = a2 + a1 * dq07.powf(a3);
                quad_mean_diameter_util
                    .set(uc, 22.5f32.max(dq07 + a0 * (1.0 - exponent_ratio(logit)?)));
            }
            UtilizationClass::All | UtilizationClass::Small => unreachable!(),
        }
    }

    Ok(())
}

/// EMP090: whole-stem volume per tree from lorey height and quadratic mean
/// diameter.
pub fn whole_stem_volume_per_tree(
    tables: &ControlData,
    volume_group: i32,
    lorey_height: f32,
    quad_mean_diameter: f32,
) -> Result<f32, GrowthError> {
    let coe = tables.total_stand_ws_volume_coe(volume_group)?;

    let log_mean_volume = coe.coe(0)
        + coe.coe(1) * quad_mean_diameter.ln()
        + coe.coe(2) * lorey_height.ln()
        + coe.coe(3) * quad_mean_diameter
        + coe.coe(4) / quad_mean_diameter
        + coe.coe(5) * lorey_height
        + coe.coe(6) * quad_mean_diameter * quad_mean_diameter
        + coe.coe(7) * lorey_height * quad_mean_diameter
        + coe.coe(8) * lorey_height / quad_mean_diameter;

    Ok(log_mean_volume.exp())
}

/// EMP091: whole-stem volume by size band from basal area. When the target is
/// All, the bands are rescaled so they sum exactly to the already-known All
/// volume.
#[allow(clippy::too_many_arguments)]
pub fn whole_stem_volume(
    tables: &ControlData,
    target: UtilizationClass,
    adjust: &UtilizationVector,
    volume_group: i32,
    lorey_height: f32,
    quad_mean_diameter_util: &UtilizationVector,
    basal_area_util: &UtilizationVector,
    whole_stem_volume_util: &mut UtilizationVector,
) -> Result<(), GrowthError> {
    let dq_sp = quad_mean_diameter_util.all();

    estimate_utilization(
        basal_area_util,
        whole_stem_volume_util,
        target,
        |uc, ba| {
            let coe = tables.util_comp_ws_volume_coe(uc.index(), volume_group)?;
            let a0 = coe.coe(0);
            let a1 = coe.coe(1);
            let a2 = coe.coe(2);
            let a3 = coe.coe(3);

            let mut arg = a0
                + a1 * lorey_height.ln()
                + a2 * quad_mean_diameter_util.get(uc).ln()
                + if uc != UtilizationClass::Over225 {
                    a3 * dq_sp.ln()
                } else {
                    a3 * dq_sp
                };
            arg += adjust.get(uc);

            let volume_per_area = safe_exponent(arg)?;
            Ok(ba * volume_per_area)
        },
        |ba| ba <= 0.0,
        0.0,
    )?;

    if target == UtilizationClass::All {
        normalize_components(whole_stem_volume_util)?;
    }
    Ok(())
}

/// EMP092: close-utilization volume by size band from whole-stem volume.
#[allow(clippy::too_many_arguments)]
pub fn close_utilization_volume(
    tables: &ControlData,
    target: UtilizationClass,
    adjust: &UtilizationVector,
    volume_group: i32,
    lorey_height: f32,
    quad_mean_diameter_util: &UtilizationVector,
    whole_stem_volume_util: &UtilizationVector,
    close_utilization_util: &mut UtilizationVector,
) -> Result<(), GrowthError> {
    estimate_utilization(
        whole_stem_volume_util,
        close_utilization_util,
        target,
        |uc, ws| {
            let coe = tables.close_utilization_coe(uc.index(), volume_group)?;
            let a0 = coe.coe(1);
            let a1 = coe.coe(2);
            let a2 = coe.coe(3);

            let arg = a0 + a1 * quad_mean_diameter_util.get(uc) + a2 * lorey_height + adjust.get(uc);
            Ok(ws * ratio(arg, 7.0))
        },
        never_skip,
        0.0,
    )?;

    if target == UtilizationClass::All {
        store_sum_components(close_utilization_util);
    }
    Ok(())
}

/// EMP093: volume net of decay by size band from close-utilization volume.
#[allow(clippy::too_many_arguments)]
pub fn net_decay_volume(
    tables: &ControlData,
    genus: &str,
    region: Region,
    target: UtilizationClass,
    adjust: &UtilizationVector,
    decay_group: i32,
    age_at_breast_height: f32,
    quad_mean_diameter_util: &UtilizationVector,
    close_utilization_util: &UtilizationVector,
    net_decay_util: &mut UtilizationVector,
) -> Result<(), GrowthError> {
    let dq_sp = quad_mean_diameter_util.all();
    let age_tr = 20.0f32.max(age_at_breast_height).ln();

    estimate_utilization(
        close_utilization_util,
        net_decay_util,
        target,
        |uc, cu| {
            let coe = tables.net_decay_coe(uc.index(), decay_group)?;
            let a0 = coe.coe(1);
            let a1 = coe.coe(2);
            let a2 = coe.coe(3);

            let mut arg = if uc != UtilizationClass::Over225 {
                a0 + a1 * dq_sp.ln() + a2 * age_tr
            } else {
                a0 + a1 * quad_mean_diameter_util.get(uc).ln() + a2 * age_tr
            };
            arg += adjust.get(uc) + tables.decay_modifier(genus, region)?;

            Ok(cu * ratio(arg, 8.0))
        },
        never_skip,
        0.0,
    )?;

    if target == UtilizationClass::All {
        store_sum_components(net_decay_util);
    }
    Ok(())
}

/// EMP094: volume net of decay and waste by size band.
#[allow(clippy::too_many_arguments)]
pub fn net_decay_and_waste_volume(
    tables: &ControlData,
    region: Region,
    target: UtilizationClass,
    adjust: &UtilizationVector,
    genus: &str,
    lorey_height: f32,
    quad_mean_diameter_util: &UtilizationVector,
    close_utilization_util: &UtilizationVector,
    net_decay_util: &UtilizationVector,
    net_decay_waste_util: &mut UtilizationVector,
) -> Result<(), GrowthError> {
    estimate_utilization(
        net_decay_util,
        net_decay_waste_util,
        target,
        |uc, net_decay| {
            if net_decay.is_nan() || net_decay <= 0.0 {
                return Ok(0.0);
            }

            let coe = tables.net_decay_waste_coe(genus)?;
            let mut a0 = coe.coe(0);
            let a1 = coe.coe(1);
            let a2 = coe.coe(2);
            let a3 = coe.coe(3);
            let a4 = coe.coe(4);
            let a5 = coe.coe(5);

            if uc == UtilizationClass::Over225 {
                a0 += a5;
            }

            let frd = 1.0 - net_decay / close_utilization_util.get(uc);

            let mut arg = a0
                + a1 * frd
                + a3 * quad_mean_diameter_util.get(uc).ln()
                + a4 * lorey_height.ln();
            arg += tables.waste_modifier(genus, region)?;
            arg = arg.clamp(-10.0, 10.0);

            let mut frw = (1.0 - (a2 * frd).exp()) * arg.exp() / (1.0 + arg.exp()) * (1.0 - frd);
            frw = frd.min(frw);

            let mut result = close_utilization_util.get(uc) * (1.0 - frd - frw);

            // Adjustments are applied after the estimate so that frw has
            // already been clamped to frd.
            if adjust.get(uc) != 0.0 {
                let r = result / net_decay;
                if r < 1.0 && r > 0.0 {
                    let mut arg2 = (r / (1.0 - r)).ln();
                    arg2 += adjust.get(uc);
                    arg2 = arg2.clamp(-10.0, 10.0);
                    result = arg2.exp() / (1.0 + arg2.exp()) * net_decay;
                }
            }

            Ok(result)
        },
        never_skip,
        0.0,
    )?;

    if target == UtilizationClass::All {
        store_sum_components(net_decay_waste_util);
    }
    Ok(())
}

/// EMP095: volume net of decay, waste and breakage by size band.
#[allow(clippy::too_many_arguments)]
pub fn net_decay_waste_breakage_volume(
    tables: &ControlData,
    target: UtilizationClass,
    breakage_group: i32,
    quad_mean_diameter_util: &UtilizationVector,
    close_utilization_util: &UtilizationVector,
    net_decay_waste_util: &UtilizationVector,
    net_decay_waste_breakage_util: &mut UtilizationVector,
) -> Result<(), GrowthError> {
    let coe = tables.breakage_coe(breakage_group)?;
    let a1 = coe.coe(1);
    let a2 = coe.coe(2);
    let a3 = coe.coe(3);
    let a4 = coe.coe(4);

    estimate_utilization(
        net_decay_waste_util,
        net_decay_waste_breakage_util,
        target,
        |uc, net_waste| {
            if net_waste <= 0.0 {
                return Ok(0.0);
            }
            let percent_broken =
                (a1 + a2 * quad_mean_diameter_util.get(uc).ln()).clamp(a3, a4);
            let broken = (percent_broken / 100.0 * close_utilization_util.get(uc)).min(net_waste);
            Ok(net_waste - broken)
        },
        never_skip,
        0.0,
    )?;

    if target == UtilizationClass::All {
        store_sum_components(net_decay_waste_breakage_util);
    }
    Ok(())
}

/// Empirical basal-area yield of the primary layer at the given dominant
/// height and breast-height age, keyed by (growth BEC, equation group).
pub fn basal_area_yield(
    tables: &ControlData,
    bec: &BecZone,
    equation_group: i32,
    dominant_height: f32,
    age_at_breast_height: f32,
    veteran_basal_area: Option<f32>,
    full_occupancy: bool,
) -> Result<f32, GrowthError> {
    let coe = tables.basal_area_yield_coe(bec.growth_alias(), equation_group)?;
    let c0 = coe.coe(0);
    let c1 = coe.coe(1);
    let c2 = coe.coe(2);
    let c3 = coe.coe(3);
    let c4 = coe.coe(4);

    if dominant_height <= 1.3 || age_at_breast_height <= 0.0 {
        return Ok(0.0);
    }

    let vet = veteran_basal_area.unwrap_or(0.0);
    let arg = c0
        + c1 * (dominant_height - 1.3).ln()
        + c2 * age_at_breast_height.max(1.0).ln()
        + c4 * vet;
    let saturation = 1.0 - (c3 * age_at_breast_height).exp();
    let mut result = safe_exponent(arg)? * saturation.max(0.0);

    if !full_occupancy {
        result *= EMPIRICAL_OCCUPANCY;
    }
    Ok(result)
}
