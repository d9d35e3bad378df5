use crate::core::types::{Point, Rect};
use crate::core::Frame;
use crate::error::{Error, Result};

/// An ordered list of boundary points
pub type Contour = Vec<Point>;

/// Offsets of the 8-neighborhood in clockwise order starting east
const NEIGHBORS: [(i64, i64); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Find the external contours of a binary frame.
///
/// Pixels above 128 are foreground. Each 8-connected component contributes
/// one contour: its outer boundary as an ordered point list (Moore-neighbor
/// tracing), suitable for area, perimeter and hull computations.
pub fn find_contours(image: &Frame) -> Result<Vec<Contour>> {
    if image.channels() != 1 {
        return Err(Error::InvalidInput(
            "find_contours requires a single-channel image".to_string(),
        ));
    }

    let rows = image.rows();
    let cols = image.cols();
    if rows == 0 || cols == 0 {
        return Ok(Vec::new());
    }

    let data = image.data();
    let fg = |x: i64, y: i64| -> bool {
        x >= 0
            && y >= 0
            && (x as usize) < cols
            && (y as usize) < rows
            && data[(y as usize) * cols + x as usize] > 128
    };

    let mut visited = vec![false; rows * cols];
    let mut contours = Vec::new();

    for row in 0..rows {
        for col in 0..cols {
            if visited[row * cols + col] || data[row * cols + col] <= 128 {
                continue;
            }

            // First unvisited pixel of the component in scan order is its
            // topmost-leftmost pixel: the trace start.
            flood_mark(data, &mut visited, rows, cols, row, col);
            contours.push(trace_boundary(&fg, col as i64, row as i64, 4 * rows * cols + 8));
        }
    }

    Ok(contours)
}

/// Mark every pixel of the 8-connected component containing (row, col)
fn flood_mark(
    data: &[u8],
    visited: &mut [bool],
    rows: usize,
    cols: usize,
    row: usize,
    col: usize,
) {
    let mut stack = vec![(row, col)];
    visited[row * cols + col] = true;

    while let Some((r, c)) = stack.pop() {
        for (dx, dy) in NEIGHBORS {
            let nr = r as i64 + dy;
            let nc = c as i64 + dx;
            if nr < 0 || nc < 0 || nr >= rows as i64 || nc >= cols as i64 {
                continue;
            }
            let (nr, nc) = (nr as usize, nc as usize);
            if !visited[nr * cols + nc] && data[nr * cols + nc] > 128 {
                visited[nr * cols + nc] = true;
                stack.push((nr, nc));
            }
        }
    }
}

/// Moore-neighbor boundary tracing from the topmost-leftmost component pixel
fn trace_boundary(
    fg: &dyn Fn(i64, i64) -> bool,
    start_x: i64,
    start_y: i64,
    max_steps: usize,
) -> Contour {
    #[allow(clippy::cast_possible_truncation)]
    let mut contour = vec![Point::new(start_x as i32, start_y as i32)];

    // Entry direction: we conceptually arrived from the west (the start is
    // the leftmost pixel of its row within the component).
    let mut current = (start_x, start_y);
    let mut entry = 4usize; // index of the neighbor we came from (west)

    for _ in 0..max_steps {
        // Scan the 8-neighborhood clockwise, starting just after the
        // direction we entered from.
        let mut found = None;
        for i in 1..=8 {
            let dir = (entry + i) % 8;
            let (dx, dy) = NEIGHBORS[dir];
            if fg(current.0 + dx, current.1 + dy) {
                found = Some(dir);
                break;
            }
        }

        let Some(dir) = found else {
            // Isolated pixel
            break;
        };

        let (dx, dy) = NEIGHBORS[dir];
        current = (current.0 + dx, current.1 + dy);

        if current == (start_x, start_y) {
            break;
        }

        #[allow(clippy::cast_possible_truncation)]
        contour.push(Point::new(current.0 as i32, current.1 as i32));
        // Re-enter from the opposite of the move direction
        entry = (dir + 4) % 8;
    }

    contour
}

/// Contour area by the shoelace formula
#[must_use]
pub fn contour_area(contour: &Contour) -> f64 {
    if contour.len() < 3 {
        return 0.0;
    }

    let mut area = 0.0;
    for i in 0..contour.len() {
        let p1 = contour[i];
        let p2 = contour[(i + 1) % contour.len()];
        area += f64::from(p1.x) * f64::from(p2.y) - f64::from(p2.x) * f64::from(p1.y);
    }
    (area / 2.0).abs()
}

/// Arc length (perimeter) of a contour
#[must_use]
pub fn arc_length(contour: &Contour, closed: bool) -> f64 {
    if contour.len() < 2 {
        return 0.0;
    }

    let mut length = 0.0;
    for pair in contour.windows(2) {
        length += pair[0].distance_to(pair[1]);
    }
    if closed {
        length += contour[contour.len() - 1].distance_to(contour[0]);
    }
    length
}

/// Approximate a contour with fewer points (Douglas-Peucker)
#[must_use]
pub fn approx_poly_dp(contour: &Contour, epsilon: f64) -> Contour {
    if contour.len() <= 2 || epsilon <= 0.0 {
        return contour.clone();
    }
    douglas_peucker(contour, epsilon, 0, contour.len() - 1)
}

fn douglas_peucker(points: &[Point], epsilon: f64, start: usize, end: usize) -> Vec<Point> {
    if end <= start + 1 {
        return vec![points[start], points[end]];
    }

    let mut max_dist = 0.0;
    let mut max_idx = start;
    for i in start + 1..end {
        let dist = perpendicular_distance(points[i], points[start], points[end]);
        if dist > max_dist {
            max_dist = dist;
            max_idx = i;
        }
    }

    if max_dist > epsilon {
        let mut left = douglas_peucker(points, epsilon, start, max_idx);
        let right = douglas_peucker(points, epsilon, max_idx, end);
        left.pop();
        left.extend(right);
        left
    } else {
        vec![points[start], points[end]]
    }
}

fn perpendicular_distance(point: Point, line_start: Point, line_end: Point) -> f64 {
    let dx = f64::from(line_end.x - line_start.x);
    let dy = f64::from(line_end.y - line_start.y);

    let num = (dy * f64::from(point.x) - dx * f64::from(point.y)
        + f64::from(line_end.x) * f64::from(line_start.y)
        - f64::from(line_end.y) * f64::from(line_start.x))
        .abs();
    let den = (dx * dx + dy * dy).sqrt();

    if den == 0.0 {
        point.distance_to(line_start)
    } else {
        num / den
    }
}

/// Convex hull of a point set (monotone chain), counter-clockwise
#[must_use]
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut pts = points.to_vec();
    pts.sort_by(|a, b| (a.x, a.y).cmp(&(b.x, b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let cross = |o: Point, a: Point, b: Point| -> i64 {
        i64::from(a.x - o.x) * i64::from(b.y - o.y) - i64::from(a.y - o.y) * i64::from(b.x - o.x)
    };

    let mut hull: Vec<Point> = Vec::with_capacity(pts.len() * 2);
    for &p in pts.iter().chain(pts.iter().rev().skip(1)) {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

/// Inclusive bounding rectangle of a contour
#[must_use]
pub fn bounding_rect(contour: &Contour) -> Rect {
    if contour.is_empty() {
        return Rect::new(0, 0, 0, 0);
    }

    let mut min_x = contour[0].x;
    let mut max_x = contour[0].x;
    let mut min_y = contour[0].y;
    let mut max_y = contour[0].y;

    for point in contour {
        min_x = min_x.min(point.x);
        max_x = max_x.max(point.x);
        min_y = min_y.min(point.y);
        max_y = max_y.max(point.y);
    }

    Rect::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
}
