use camguard_core::Image;
use crate::types::ScoredKeypoint;
use std::collections::HashMap;

/// Non-maximum suppression and orientation assignment
pub struct KeypointRefinement;

impl KeypointRefinement {
    /// Compute orientation for keypoint using intensity centroid method.
    ///
    /// Moments are taken over the disc inscribed in the `patch_size` window;
    /// pixels outside the image are skipped.
    pub fn compute_orientation(img: &Image, width: usize, height: usize, x: f32, y: f32, patch_size: usize) -> f32 {
        let half = (patch_size / 2) as i32;
        let radius_sq = half * half;
        let (cx, cy) = (x.round() as i32, y.round() as i32);
        let mut m10 = 0i64;
        let mut m01 = 0i64;

        for dy in -half..=half {
            let yy = cy + dy;
            if yy < 0 || yy >= height as i32 {
                continue;
            }
            for dx in -half..=half {
                if dx * dx + dy * dy > radius_sq {
                    continue;
                }
                let xx = cx + dx;
                if xx < 0 || xx >= width as i32 {
                    continue;
                }
                let val = img[yy as usize * width + xx as usize] as i64;
                m10 += dx as i64 * val;
                m01 += dy as i64 * val;
            }
        }

        if m10 == 0 && m01 == 0 {
            0.0
        } else {
            (m01 as f32).atan2(m10 as f32)
        }
    }

    /// Non-maximum suppression to reduce duplicate keypoints.
    ///
    /// Greedy by descending response: a candidate survives if no stronger
    /// survivor lies closer than `min_distance`. Survivors are bucketed on a
    /// grid of `min_distance` cells so only neighbouring buckets are scanned.
    pub fn non_maximum_suppression(keypoints: &[ScoredKeypoint], min_distance: f32) -> Vec<ScoredKeypoint> {
        if keypoints.is_empty() {
            return Vec::new();
        }
        if min_distance <= 0.0 {
            return keypoints.to_vec();
        }

        let mut sorted_keypoints = keypoints.to_vec();
        sorted_keypoints.sort_by(|a, b| b.response.total_cmp(&a.response));

        let cell = |v: f32| (v / min_distance).floor() as i64;
        let mut buckets: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
        let mut suppressed: Vec<ScoredKeypoint> = Vec::new();
        let min_distance_sq = min_distance * min_distance;

        for candidate in sorted_keypoints {
            let (bx, by) = (cell(candidate.keypoint.x), cell(candidate.keypoint.y));
            let mut is_local_max = true;

            'scan: for ny in by - 1..=by + 1 {
                for nx in bx - 1..=bx + 1 {
                    let Some(indices) = buckets.get(&(nx, ny)) else {
                        continue;
                    };
                    for &idx in indices {
                        let existing = &suppressed[idx];
                        let dx = candidate.keypoint.x - existing.keypoint.x;
                        let dy = candidate.keypoint.y - existing.keypoint.y;
                        if dx * dx + dy * dy < min_distance_sq {
                            is_local_max = false;
                            break 'scan;
                        }
                    }
                }
            }

            if is_local_max {
                buckets.entry((bx, by)).or_default().push(suppressed.len());
                suppressed.push(candidate);
            }
        }

        suppressed
    }
}
