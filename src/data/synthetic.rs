//! Deterministic synthetic diamonds
//!
//! Produces the same ten columns as the public dataset. Price grows with
//! carat and with better cut, color and clarity grades, plus multiplicative
//! noise, so a shallow tree has something real to learn.

use crate::error::{DiamondError, Result};
use crate::preprocessing::schema::{CLARITY_VALUES, COLOR_VALUES, CUT_VALUES};
use polars::prelude::*;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

// Relative frequencies roughly follow the public dataset
const CUT_WEIGHTS: [f64; 5] = [0.03, 0.09, 0.22, 0.26, 0.40];

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn weighted_index(rng: &mut ChaCha8Rng, weights: &[f64]) -> usize {
    let total: f64 = weights.iter().sum();
    let mut draw = rng.gen_range(0.0..total);
    for (i, w) in weights.iter().enumerate() {
        if draw < *w {
            return i;
        }
        draw -= w;
    }
    weights.len() - 1
}

/// Generate `n` rows with columns `carat,cut,color,clarity,depth,table,price,x,y,z`
pub fn generate_diamonds(n: usize, seed: u64) -> Result<DataFrame> {
    if n == 0 {
        return Err(DiamondError::InvalidParameter {
            name: "n".to_string(),
            value: "0".to_string(),
            reason: "must generate at least one row".to_string(),
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut carat = Vec::with_capacity(n);
    let mut cut = Vec::with_capacity(n);
    let mut color = Vec::with_capacity(n);
    let mut clarity = Vec::with_capacity(n);
    let mut depth = Vec::with_capacity(n);
    let mut table = Vec::with_capacity(n);
    let mut price = Vec::with_capacity(n);
    let mut x = Vec::with_capacity(n);
    let mut y = Vec::with_capacity(n);
    let mut z = Vec::with_capacity(n);

    for _ in 0..n {
        let u: f64 = rng.gen();
        let c = round2(0.2 + 2.8 * u * u);

        let cut_idx = weighted_index(&mut rng, &CUT_WEIGHTS);
        let color_idx = rng.gen_range(0..COLOR_VALUES.len());
        let clarity_idx = rng.gen_range(0..CLARITY_VALUES.len());

        let d = round2(rng.gen_range(58.0..65.0));
        let t = round2(rng.gen_range(53.0..62.0)).round();

        let xv = round2(6.4 * c.cbrt() * rng.gen_range(0.98..1.02));
        let yv = round2(xv * rng.gen_range(0.99..1.01));
        let zv = round2(xv * d / 100.0);

        // Better grades sit later in the cut/clarity lists and earlier in color
        let quality = 1.0
            + 0.05 * cut_idx as f64
            + 0.06 * (COLOR_VALUES.len() - 1 - color_idx) as f64
            + 0.08 * clarity_idx as f64;
        let noise = rng.gen_range(0.9..1.1);
        let p = (3900.0 * c.powf(1.7) * quality * noise).round().max(326.0) as i64;

        carat.push(c);
        cut.push(CUT_VALUES[cut_idx]);
        color.push(COLOR_VALUES[color_idx]);
        clarity.push(CLARITY_VALUES[clarity_idx]);
        depth.push(d);
        table.push(t);
        price.push(p);
        x.push(xv);
        y.push(yv);
        z.push(zv);
    }

    let df = DataFrame::new(vec![
        Column::new("carat".into(), carat),
        Column::new("cut".into(), cut),
        Column::new("color".into(), color),
        Column::new("clarity".into(), clarity),
        Column::new("depth".into(), depth),
        Column::new("table".into(), table),
        Column::new("price".into(), price),
        Column::new("x".into(), x),
        Column::new("y".into(), y),
        Column::new("z".into(), z),
    ])?;
    Ok(df)
}
