//! Analyze a small synthetic chip end-to-end and print the well table
//! summary.

use image::Luma;
use std::error::Error;
use wellgrid::{
    AnalysisConfig, CancelToken, ChipAnalyzer, CornerSample, Frame, GridShape, ImageSet,
    ImageStack, Transcript,
};

fn disk_grid(w: u32, h: u32, origin: f64, pitch: f64, n: u32, radius: f64, fg: f32, bg: f32) -> Frame {
    let r2 = radius * radius;
    Frame::from_fn(w, h, |x, y| {
        let mut inside = false;
        for col in 0..n {
            for row in 0..n {
                let dx = x as f64 - (origin + pitch * col as f64);
                let dy = y as f64 - (origin + pitch * row as f64);
                if dx * dx + dy * dy <= r2 {
                    inside = true;
                }
            }
        }
        Luma([if inside { fg } else { bg }])
    })
}

fn corner(cx: f64, cy: f64, r: f64) -> CornerSample {
    let at = |deg: f64| {
        let a = deg.to_radians();
        [cx + r * a.cos(), cy + r * a.sin()]
    };
    CornerSample::new(vec![at(20.0), at(140.0), at(260.0)])
}

fn main() -> Result<(), Box<dyn Error>> {
    let shape = GridShape::new(8, 8);
    let (origin, pitch) = (40.0, 30.0);
    let far = origin + pitch * 7.0;

    let surface = disk_grid(320, 320, origin, pitch, 8, 4.0, 3000.0, 200.0);
    let solubilized = disk_grid(320, 320, origin, pitch, 8, 7.0, 2500.0, 150.0);
    let captured = disk_grid(320, 320, origin, pitch, 8, 4.0, 1200.0, 180.0);
    let images = ImageSet::new(
        surface,
        ImageStack::new(vec![solubilized])?,
        ImageStack::new(vec![captured])?,
    )?;

    let button_corners = [
        corner(origin, origin, 6.0),
        corner(far, origin, 6.0),
        corner(origin, far, 6.0),
        corner(far, far, 6.0),
    ];
    let chamber_corners = [
        corner(origin, origin, 8.0),
        corner(far, origin, 8.0),
        corner(origin, far, 8.0),
        corner(far, far, 8.0),
    ];

    let analyzer = ChipAnalyzer::new(AnalysisConfig::for_shape(shape))?;
    let records = analyzer.run(
        &images,
        &button_corners,
        &chamber_corners,
        &Transcript::confirm_all(),
        &CancelToken::new(),
    )?;

    let n_auto = records.iter().filter(|r| r.button.autofind).count();
    println!(
        "Extracted {} wells ({} buttons auto-detected).",
        records.len(),
        n_auto
    );
    if let Some(first) = records.first() {
        println!(
            "Well (1,1): button fg mean {:.1}, background sum {:.1}",
            first.surface.foreground.mean, first.surface.background.sum
        );
    }
    Ok(())
}
