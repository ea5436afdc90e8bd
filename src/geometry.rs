//! Overlay geometry across monitors

/// Screen rectangle in virtual-desktop pixels; `right`/`bottom` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub const fn from_origin_size(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub const fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Same rectangle in coordinates relative to `origin`'s top-left.
    pub const fn relative_to(&self, origin: &Rect) -> Rect {
        Rect::new(
            self.left - origin.left,
            self.top - origin.top,
            self.right - origin.left,
            self.bottom - origin.top,
        )
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let r = Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        (!r.is_empty()).then_some(r)
    }
}

/// One display as reported by the windowing system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Monitor {
    pub rect: Rect,
    pub primary: bool,
}

/// Smallest rectangle covering every monitor: min top-left, max
/// bottom-right. Handles mixed resolutions, rotation and gaps. `None` when
/// there are no usable monitors.
pub fn combined_bounds<'a, I>(rects: I) -> Option<Rect>
where
    I: IntoIterator<Item = &'a Rect>,
{
    rects
        .into_iter()
        .filter(|r| !r.is_empty())
        .fold(None, |acc: Option<Rect>, r| {
            Some(match acc {
                None => *r,
                Some(a) => Rect::new(
                    a.left.min(r.left),
                    a.top.min(r.top),
                    a.right.max(r.right),
                    a.bottom.max(r.bottom),
                ),
            })
        })
}

/// Where the overlay should place its status text, in overlay-client
/// coordinates: the primary monitor's area (falling back to the first
/// monitor), clipped to the overlay. The centre of the combined bounds can
/// land in a gap between screens, so it is never used directly.
pub fn text_region(bounds: &Rect, monitors: &[Monitor]) -> Rect {
    let anchor = monitors
        .iter()
        .find(|m| m.primary)
        .or_else(|| monitors.first())
        .and_then(|m| m.rect.intersect(bounds))
        .unwrap_or(*bounds);
    anchor.relative_to(bounds)
}

/// Full overlay placement: window rectangle plus text region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayLayout {
    pub bounds: Rect,
    pub text: Rect,
}

impl OverlayLayout {
    /// `fallback` is the primary screen rectangle, used when enumeration
    /// produced nothing usable.
    pub fn compute(monitors: &[Monitor], fallback: Rect) -> Self {
        match combined_bounds(monitors.iter().map(|m| &m.rect)) {
            Some(bounds) => Self {
                bounds,
                text: text_region(&bounds, monitors),
            },
            None => Self {
                bounds: fallback,
                text: fallback.relative_to(&fallback),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(x: i32, y: i32, w: i32, h: i32, primary: bool) -> Monitor {
        Monitor {
            rect: Rect::from_origin_size(x, y, w, h),
            primary,
        }
    }

    #[test]
    fn rotated_second_monitor() {
        let rects = [
            Rect::from_origin_size(0, 0, 1920, 1080),
            Rect::from_origin_size(1920, 0, 1080, 1920),
        ];
        assert_eq!(
            combined_bounds(rects.iter()),
            Some(Rect::new(0, 0, 3000, 1920))
        );
    }

    #[test]
    fn monitor_left_of_primary_has_negative_origin() {
        let rects = [
            Rect::from_origin_size(0, 0, 2560, 1440),
            Rect::from_origin_size(-1920, 200, 1920, 1080),
        ];
        let bounds = combined_bounds(rects.iter()).unwrap();
        assert_eq!(bounds, Rect::new(-1920, 0, 2560, 1440));
        assert_eq!(bounds.width(), 4480);
    }

    #[test]
    fn non_contiguous_layout_is_not_width_summed() {
        let rects = [
            Rect::from_origin_size(0, 0, 1920, 1080),
            Rect::from_origin_size(0, 1080, 1920, 1080),
        ];
        assert_eq!(
            combined_bounds(rects.iter()),
            Some(Rect::new(0, 0, 1920, 2160))
        );
    }

    #[test]
    fn empty_input_has_no_bounds() {
        assert_eq!(combined_bounds([].iter()), None);
        assert_eq!(combined_bounds([Rect::new(5, 5, 5, 5)].iter()), None);
    }

    #[test]
    fn text_goes_on_the_primary_monitor() {
        let monitors = [
            monitor(-1920, 0, 1920, 1080, false),
            monitor(0, 0, 2560, 1440, true),
        ];
        let layout = OverlayLayout::compute(&monitors, Rect::default());
        assert_eq!(layout.bounds, Rect::new(-1920, 0, 2560, 1440));
        assert_eq!(layout.text, Rect::new(1920, 0, 4480, 1440));
    }

    #[test]
    fn text_falls_back_to_first_monitor_without_primary() {
        let monitors = [
            monitor(0, 0, 1920, 1080, false),
            monitor(1920, 0, 1920, 1080, false),
        ];
        let layout = OverlayLayout::compute(&monitors, Rect::default());
        assert_eq!(layout.text, Rect::new(0, 0, 1920, 1080));
    }

    #[test]
    fn enumeration_failure_uses_fallback_screen() {
        let fallback = Rect::from_origin_size(0, 0, 1366, 768);
        let layout = OverlayLayout::compute(&[], fallback);
        assert_eq!(layout.bounds, fallback);
        assert_eq!(layout.text, Rect::new(0, 0, 1366, 768));
    }
}
