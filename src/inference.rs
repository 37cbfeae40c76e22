use crate::error::{PhysicsError, Result};
use crate::model::FieldModel;
use crate::points::Points;
use crate::spaces::Space;
use burn::prelude::Backend;
use plotters::prelude::*;
use std::path::Path;
use std::time::Instant;

/// 点群でモデルを評価し、出力空間上の点群として返します。
pub fn evaluate<B: Backend, M: FieldModel<B>>(model: &M, points: &Points, device: &B::Device) -> Result<Points> {
    let inference_start = Instant::now();
    let predictions = model.forward_points(points, device)?;
    log::debug!(
        "推論が完了しました。入力点数: {}, 出力テンソルの形状: {:?}, 推論時間: {:.2?}",
        points.len(),
        predictions.dims(),
        inference_start.elapsed()
    );
    Points::from_tensor(predictions, model.output_space().clone())
}

/// 相対 L2 誤差 `‖pred - exact‖ / ‖exact‖`。
pub fn relative_l2_error(prediction: &[f32], exact: &[f32]) -> Result<f32> {
    if prediction.len() != exact.len() {
        return Err(PhysicsError::ShapeMismatch(format!(
            "予測値 {} 個と厳密解 {} 個の数が一致しません",
            prediction.len(),
            exact.len()
        )));
    }
    let diff: f32 = prediction
        .iter()
        .zip(exact)
        .map(|(p, e)| (p - e) * (p - e))
        .sum();
    let norm: f32 = exact.iter().map(|e| e * e).sum();
    if norm == 0.0 {
        return Ok(diff.sqrt());
    }
    Ok((diff / norm).sqrt())
}

fn column_names(space: &Space) -> Vec<String> {
    space
        .iter()
        .flat_map(|(name, dim)| {
            (0..dim).map(move |i| {
                if dim == 1 {
                    name.to_string()
                } else {
                    format!("{}_{}", name, i)
                }
            })
        })
        .collect()
}

/// 入力点と予測値をCSVファイルに書き出します。
pub fn write_csv(inputs: &Points, outputs: &Points, path: &Path) -> Result<()> {
    if inputs.len() != outputs.len() {
        return Err(PhysicsError::ShapeMismatch(format!(
            "入力点 {} 個と出力 {} 個の数が一致しません",
            inputs.len(),
            outputs.len()
        )));
    }
    let mut writer = csv::Writer::from_path(path)?;
    let mut header = column_names(inputs.space());
    header.extend(column_names(outputs.space()));
    writer.write_record(&header)?;
    for i in 0..inputs.len() {
        let record: Vec<String> = inputs
            .row(i)
            .iter()
            .chain(outputs.row(i))
            .map(|v| v.to_string())
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// 2次元の入力点上の値をヒートマップとしてPNGファイルに出力します。
pub fn plot_heatmap(inputs: &Points, values: &[f32], title: &str, path: &Path) -> Result<()> {
    if inputs.dim() != 2 || inputs.len() != values.len() {
        return Err(PhysicsError::ShapeMismatch(format!(
            "ヒートマップには2次元の入力点と同数の値が必要です (入力 {} 次元 {} 点, 値 {} 個)",
            inputs.dim(),
            inputs.len(),
            values.len()
        )));
    }
    draw_heatmap(inputs, values, title, path).map_err(|e| PhysicsError::Plot(e.to_string()))
}

fn draw_heatmap(
    inputs: &Points,
    values: &[f32],
    title: &str,
    path: &Path,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let bounds = |k: usize| {
        (0..inputs.len()).fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), i| {
            let v = inputs.row(i)[k];
            (lo.min(v), hi.max(v))
        })
    };
    let (x_min, x_max) = bounds(0);
    let (y_min, y_max) = bounds(1);
    let (v_min, v_max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = (v_max - v_min).max(f32::EPSILON);
    let names = column_names(inputs.space());

    let root = BitMapBackend::new(path, (800, 700)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max.max(x_min + f32::EPSILON), y_min..y_max.max(y_min + f32::EPSILON))?;
    chart
        .configure_mesh()
        .x_desc(names[0].as_str())
        .y_desc(names[1].as_str())
        .draw()?;
    chart.draw_series((0..inputs.len()).map(|i| {
        let row = inputs.row(i);
        let t = ((values[i] - v_min) / range) as f64;
        let color = HSLColor(0.7 * (1.0 - t), 0.9, 0.5);
        Circle::new((row[0], row[1]), 4, color.filled())
    }))?;
    root.present()?;
    Ok(())
}
