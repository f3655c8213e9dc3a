use crate::error::AssetError;
use glam::Vec2;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// One drawing command of a glyph outline, in laid-out text units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathCommand {
    MoveTo(Vec2),
    LineTo(Vec2),
    QuadTo { ctrl: Vec2, to: Vec2 },
    CubicTo { ctrl1: Vec2, ctrl2: Vec2, to: Vec2 },
}

impl PathCommand {
    fn map(self, f: impl Fn(Vec2) -> Vec2) -> Self {
        match self {
            PathCommand::MoveTo(p) => PathCommand::MoveTo(f(p)),
            PathCommand::LineTo(p) => PathCommand::LineTo(f(p)),
            PathCommand::QuadTo { ctrl, to } => PathCommand::QuadTo {
                ctrl: f(ctrl),
                to: f(to),
            },
            PathCommand::CubicTo { ctrl1, ctrl2, to } => PathCommand::CubicTo {
                ctrl1: f(ctrl1),
                ctrl2: f(ctrl2),
                to: f(to),
            },
        }
    }
}

/// A positioned glyph outline produced by [`Font::layout`].
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphPath {
    pub glyph: char,
    pub commands: Vec<PathCommand>,
}

impl GlyphPath {
    /// Flatten into closed polylines, one per `MoveTo`.
    ///
    /// Curves are sampled at `curve_segments` evenly spaced parameters. A
    /// closing point that repeats the first is dropped, as are contours with
    /// fewer than three points.
    pub fn contours(&self, curve_segments: u32) -> Vec<Vec<Vec2>> {
        let segments = curve_segments.max(1);
        let mut contours = Vec::new();
        let mut current: Vec<Vec2> = Vec::new();
        let mut cursor = Vec2::ZERO;

        for command in &self.commands {
            match *command {
                PathCommand::MoveTo(p) => {
                    contours.push(std::mem::take(&mut current));
                    current.push(p);
                    cursor = p;
                }
                PathCommand::LineTo(p) => {
                    current.push(p);
                    cursor = p;
                }
                PathCommand::QuadTo { ctrl, to } => {
                    let from = cursor;
                    for j in 1..=segments {
                        let t = j as f32 / segments as f32;
                        let u = 1.0 - t;
                        current.push(from * u * u + ctrl * 2.0 * u * t + to * t * t);
                    }
                    cursor = to;
                }
                PathCommand::CubicTo { ctrl1, ctrl2, to } => {
                    let from = cursor;
                    for j in 1..=segments {
                        let t = j as f32 / segments as f32;
                        let u = 1.0 - t;
                        current.push(
                            from * u * u * u
                                + ctrl1 * 3.0 * u * u * t
                                + ctrl2 * 3.0 * u * t * t
                                + to * t * t * t,
                        );
                    }
                    cursor = to;
                }
            }
        }
        contours.push(current);

        contours
            .into_iter()
            .filter_map(|mut c| {
                if c.len() > 1 && c[0].distance_squared(c[c.len() - 1]) < 1e-12 {
                    c.pop();
                }
                (c.len() >= 3).then_some(c)
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
struct Glyph {
    advance: f32,
    commands: Vec<PathCommand>,
}

/// A typeface-JSON font: glyph outlines in font units plus vertical metrics.
#[derive(Debug, Clone)]
pub struct Font {
    pub family: String,
    pub resolution: f32,
    pub ascent: f32,
    pub descent: f32,
    pub underline_thickness: f32,
    glyphs: BTreeMap<char, Glyph>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypefaceJson {
    #[serde(default)]
    family_name: String,
    resolution: f32,
    bounding_box: BoundingBoxJson,
    #[serde(default)]
    underline_thickness: f32,
    glyphs: HashMap<String, GlyphJson>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoundingBoxJson {
    y_min: f32,
    y_max: f32,
}

#[derive(Deserialize)]
struct GlyphJson {
    ha: f32,
    #[serde(default)]
    o: Option<String>,
}

impl Font {
    /// Parse a typeface JSON document. Every outline is validated up front.
    pub fn from_json(bytes: &[u8]) -> Result<Self, AssetError> {
        let raw: TypefaceJson = serde_json::from_slice(bytes)?;
        if raw.resolution <= 0.0 {
            return Err(AssetError::InvalidOutline {
                glyph: String::new(),
                reason: format!("resolution must be positive, got {}", raw.resolution),
            });
        }

        let mut glyphs = BTreeMap::new();
        for (key, glyph) in raw.glyphs {
            let mut chars = key.chars();
            let (Some(ch), None) = (chars.next(), chars.next()) else {
                tracing::debug!(key = %key, "skipping multi-character glyph key");
                continue;
            };
            let commands = match glyph.o.as_deref() {
                Some(outline) => parse_outline(ch, outline)?,
                None => Vec::new(),
            };
            glyphs.insert(
                ch,
                Glyph {
                    advance: glyph.ha,
                    commands,
                },
            );
        }

        tracing::info!(
            family = %raw.family_name,
            glyphs = glyphs.len(),
            resolution = raw.resolution,
            "font parsed"
        );
        Ok(Self {
            family: raw.family_name,
            resolution: raw.resolution,
            ascent: raw.bounding_box.y_max,
            descent: raw.bounding_box.y_min,
            underline_thickness: raw.underline_thickness,
            glyphs,
        })
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    pub fn has_glyph(&self, ch: char) -> bool {
        self.glyphs.contains_key(&ch)
    }

    /// Distance between baselines for text of the given size.
    pub fn line_height(&self, size: f32) -> f32 {
        (self.ascent - self.descent + self.underline_thickness) * size / self.resolution
    }

    /// Characters of `text` with neither a glyph nor a `?` fallback.
    pub fn missing_glyphs(&self, text: &str) -> Vec<char> {
        let fallback = self.glyphs.contains_key(&'?');
        text.chars()
            .filter(|c| *c != '\n' && !fallback && !self.glyphs.contains_key(c))
            .collect()
    }

    /// Lay out `text` at `size` units per em, left to right from the origin.
    ///
    /// `\n` starts a new line below. Characters without a glyph use `?`; if
    /// the font has no `?` either they are skipped.
    pub fn layout(&self, text: &str, size: f32) -> Vec<GlyphPath> {
        let scale = size / self.resolution;
        let line_height = self.line_height(size);
        let mut offset = Vec2::ZERO;
        let mut paths = Vec::new();

        for ch in text.chars() {
            if ch == '\n' {
                offset.x = 0.0;
                offset.y -= line_height;
                continue;
            }
            let Some(glyph) = self.glyphs.get(&ch).or_else(|| self.glyphs.get(&'?')) else {
                tracing::warn!(%ch, family = %self.family, "character missing from font");
                continue;
            };
            let origin = offset;
            paths.push(GlyphPath {
                glyph: ch,
                commands: glyph
                    .commands
                    .iter()
                    .map(|c| c.map(|p| p * scale + origin))
                    .collect(),
            });
            offset.x += glyph.advance * scale;
        }
        paths
    }
}

/// Parse a typeface outline string (`m x y`, `l x y`, `q x y cx cy`,
/// `b x y c1x c1y c2x c2y`). Endpoints precede control points.
fn parse_outline(glyph: char, outline: &str) -> Result<Vec<PathCommand>, AssetError> {
    let invalid = |reason: String| AssetError::InvalidOutline {
        glyph: glyph.to_string(),
        reason,
    };

    let mut tokens = outline.split_whitespace();
    let next_point = |tokens: &mut std::str::SplitWhitespace<'_>, op: &str| {
        let mut coord = || -> Result<f32, AssetError> {
            let token = tokens
                .next()
                .ok_or_else(|| invalid(format!("`{op}` is missing operands")))?;
            token
                .parse::<f32>()
                .map_err(|_| invalid(format!("bad number {token:?} after `{op}`")))
        };
        Ok::<Vec2, AssetError>(Vec2::new(coord()?, coord()?))
    };

    let mut commands = Vec::new();
    let mut started = false;
    while let Some(op) = tokens.next() {
        let command = match op {
            "m" => {
                started = true;
                PathCommand::MoveTo(next_point(&mut tokens, op)?)
            }
            "l" => PathCommand::LineTo(next_point(&mut tokens, op)?),
            "q" => {
                let to = next_point(&mut tokens, op)?;
                let ctrl = next_point(&mut tokens, op)?;
                PathCommand::QuadTo { ctrl, to }
            }
            "b" => {
                let to = next_point(&mut tokens, op)?;
                let ctrl1 = next_point(&mut tokens, op)?;
                let ctrl2 = next_point(&mut tokens, op)?;
                PathCommand::CubicTo { ctrl1, ctrl2, to }
            }
            "z" => continue,
            other => return Err(invalid(format!("unknown command {other:?}"))),
        };
        if !started {
            return Err(invalid(format!("`{op}` before the first `m`")));
        }
        commands.push(command);
    }
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::box_typeface_json;

    fn font() -> Font {
        Font::from_json(box_typeface_json().as_bytes()).unwrap()
    }

    #[test]
    fn parses_metrics_and_glyphs() {
        let font = font();
        assert_eq!(font.family, "Box");
        assert_eq!(font.glyph_count(), 4);
        assert!(font.has_glyph('O'));
        // (800 - -200 + 50) / 1000
        assert!((font.line_height(1.0) - 1.05).abs() < 1e-6);
    }

    #[test]
    fn quadratic_operands_are_endpoint_then_control() {
        let cmds = parse_outline('x', "m 0 0 q 10 0 5 5").unwrap();
        assert_eq!(
            cmds[1],
            PathCommand::QuadTo {
                ctrl: Vec2::new(5.0, 5.0),
                to: Vec2::new(10.0, 0.0),
            }
        );
        let cmds = parse_outline('x', "m 0 0 b 9 0 1 1 2 2").unwrap();
        assert_eq!(
            cmds[1],
            PathCommand::CubicTo {
                ctrl1: Vec2::new(1.0, 1.0),
                ctrl2: Vec2::new(2.0, 2.0),
                to: Vec2::new(9.0, 0.0),
            }
        );
    }

    #[test]
    fn malformed_outlines_are_rejected() {
        assert!(parse_outline('x', "m 0").is_err());
        assert!(parse_outline('x', "m 0 zero").is_err());
        assert!(parse_outline('x', "l 1 1").is_err());
        assert!(parse_outline('x', "m 0 0 k 1 1").is_err());
        assert!(parse_outline('x', "").unwrap().is_empty());
    }

    #[test]
    fn layout_advances_and_wraps() {
        let font = font();
        let paths = font.layout("O?\nD", 1.0);
        assert_eq!(paths.len(), 3);

        let first = |p: &GlyphPath| match p.commands[0] {
            PathCommand::MoveTo(at) => at,
            other => panic!("expected move, got {other:?}"),
        };
        assert_eq!(first(&paths[0]), Vec2::ZERO);
        assert!((first(&paths[1]).x - 0.7).abs() < 1e-6);
        let third = first(&paths[2]);
        assert_eq!(third.x, 0.0);
        assert!((third.y + 1.05).abs() < 1e-6);
    }

    #[test]
    fn missing_characters_fall_back_to_question_mark() {
        let font = font();
        let paths = font.layout("@", 0.5);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].glyph, '@');
        assert!(font.missing_glyphs("@identicals_ff").is_empty());
        assert_eq!(paths[0].commands.len(), 4);
    }

    #[test]
    fn flattening_samples_curves_and_splits_contours() {
        let font = font();
        let ring = &font.layout("O", 1.0)[0];
        let contours = ring.contours(12);
        assert_eq!(contours.len(), 2);
        assert_eq!(contours[0].len(), 4);

        let d = &font.layout("D", 1.0)[0];
        let contours = d.contours(4);
        assert_eq!(contours.len(), 1);
        // three lines plus two curves of four samples each
        assert_eq!(contours[0].len(), 3 + 4 + 4);
        let space = &font.layout(" ", 1.0)[0];
        assert!(space.contours(12).is_empty());
    }
}
