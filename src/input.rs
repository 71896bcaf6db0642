use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::geom::Point2d;

/// Read an array input file: one body per line, two whitespace-separated
/// floats `x y`. Blank lines are skipped; anything else malformed is an
/// input error.
pub fn read_points(path: &Path) -> crate::Result<Vec<Point2d>> {
    let file = File::open(path)
        .map_err(|e| format!("open {}: {}", path.display(), e))?;
    let mut points = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next()) {
            (None, _) => continue,
            (Some(xs), Some(ys)) => {
                let x: f64 = xs
                    .parse()
                    .map_err(|e| format!("{}:{}: {}", path.display(), lineno + 1, e))?;
                let y: f64 = ys
                    .parse()
                    .map_err(|e| format!("{}:{}: {}", path.display(), lineno + 1, e))?;
                points.push(Point2d::new(x, y));
            }
            _ => {
                return Err(format!(
                    "{}:{}: expected two floats per line",
                    path.display(),
                    lineno + 1
                )
                .into())
            }
        }
    }
    Ok(points)
}
