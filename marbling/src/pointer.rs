use crate::color::Rgb;
use crate::events::Event;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerId {
    Mouse,
    Touch(i64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerState {
    Up,
    Down,
    Moving,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pointer {
    pub id: PointerId,
    pub texcoord: [f32; 2],
    pub prev_texcoord: [f32; 2],
    pub delta: [f32; 2],
    pub down: bool,
    // Set by a move with a non-zero delta, consumed by the next frame.
    pub moved: bool,
    pub color: Rgb,
}

impl Pointer {
    pub fn new(id: PointerId) -> Self {
        Self {
            id,
            texcoord: [0.0, 0.0],
            prev_texcoord: [0.0, 0.0],
            delta: [0.0, 0.0],
            down: false,
            moved: false,
            color: Rgb::new(30.0, 0.0, 300.0),
        }
    }

    pub fn state(&self) -> PointerState {
        match (self.down, self.moved) {
            (false, _) => PointerState::Up,
            (true, false) => PointerState::Down,
            (true, true) => PointerState::Moving,
        }
    }

    pub fn press(&mut self, id: PointerId, texcoord: [f32; 2], color: Rgb) {
        self.id = id;
        self.down = true;
        self.moved = false;
        self.texcoord = texcoord;
        self.prev_texcoord = texcoord;
        self.delta = [0.0, 0.0];
        self.color = color;
    }

    pub fn move_to(&mut self, texcoord: [f32; 2], aspect_ratio: f32) {
        if !self.down {
            return;
        }

        self.prev_texcoord = self.texcoord;
        self.texcoord = texcoord;
        self.delta = correct_delta(
            [
                texcoord[0] - self.prev_texcoord[0],
                texcoord[1] - self.prev_texcoord[1],
            ],
            aspect_ratio,
        );
        self.moved = self.delta[0].abs() > 0.0 || self.delta[1].abs() > 0.0;
    }

    // A stroke only counts if the last sample actually went somewhere.
    pub fn release(&mut self) -> Option<Event> {
        if !self.down {
            return None;
        }
        self.down = false;

        if self.prev_texcoord != self.texcoord {
            Some(Event::StrokeCompleted)
        } else {
            None
        }
    }
}

// Deltas are measured in texcoords, so a drag of the same physical length
// would be stretched along the long side. Scale it back.
pub fn correct_delta(delta: [f32; 2], aspect_ratio: f32) -> [f32; 2] {
    let [mut dx, mut dy] = delta;

    if aspect_ratio < 1.0 {
        dx *= aspect_ratio;
    }
    if aspect_ratio > 1.0 {
        dy /= aspect_ratio;
    }

    [dx, dy]
}

/// Where the drawing buffer sits on the page, and how big it is.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasGeometry {
    pub client_left: f32,
    pub client_top: f32,
    pub css_width: f32,
    pub css_height: f32,
    pub device_width: u32,
    pub device_height: u32,
}

impl CanvasGeometry {
    // A canvas that fills a window at the origin with no CSS scaling.
    pub fn from_device_size(width: u32, height: u32) -> Self {
        Self {
            client_left: 0.0,
            client_top: 0.0,
            css_width: width as f32,
            css_height: height as f32,
            device_width: width,
            device_height: height,
        }
    }

    // The drawing buffer changed size but the canvas stayed where it was.
    pub fn with_device_size(&self, width: u32, height: u32) -> Self {
        Self {
            device_width: width,
            device_height: height,
            ..*self
        }
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.device_width.max(1) as f32 / self.device_height.max(1) as f32
    }

    pub fn to_device(&self, client_x: f32, client_y: f32) -> (f32, f32) {
        let scale_x = self.device_width as f32 / self.css_width.max(f32::EPSILON);
        let scale_y = self.device_height as f32 / self.css_height.max(f32::EPSILON);

        (
            (client_x - self.client_left) * scale_x,
            (client_y - self.client_top) * scale_y,
        )
    }

    // Texcoords have their origin at the bottom left.
    pub fn texcoord(&self, client_x: f32, client_y: f32) -> [f32; 2] {
        let (x, y) = self.to_device(client_x, client_y);
        [
            x / self.device_width.max(1) as f32,
            1.0 - y / self.device_height.max(1) as f32,
        ]
    }
}

/// A touch sample in texcoords.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Touch {
    pub id: i64,
    pub texcoord: [f32; 2],
}

/// Every pointer the canvas has seen. Slot 0 is the mouse; touches reuse
/// slots 1.. in the order the platform lists them.
pub struct Pointers {
    pointers: Vec<Pointer>,
}

impl Default for Pointers {
    fn default() -> Self {
        Self {
            pointers: vec![Pointer::new(PointerId::Mouse)],
        }
    }
}

impl Pointers {
    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pointer> {
        self.pointers.iter()
    }

    pub fn mouse(&self) -> &Pointer {
        &self.pointers[0]
    }

    pub fn mouse_down(&mut self, texcoord: [f32; 2], color: Rgb) {
        self.pointers[0].press(PointerId::Mouse, texcoord, color);
    }

    pub fn mouse_move(&mut self, texcoord: [f32; 2], aspect_ratio: f32) {
        self.pointers[0].move_to(texcoord, aspect_ratio);
    }

    pub fn mouse_up(&mut self) -> Option<Event> {
        self.pointers[0].release()
    }

    pub fn touch_start(&mut self, touches: &[Touch], color: Rgb) {
        while touches.len() >= self.pointers.len() {
            self.pointers.push(Pointer::new(PointerId::Touch(-1)));
        }

        for (slot, touch) in touches.iter().enumerate() {
            self.pointers[slot + 1].press(PointerId::Touch(touch.id), touch.texcoord, color);
        }
    }

    pub fn touch_move(&mut self, touches: &[Touch], aspect_ratio: f32) {
        for touch in touches {
            if let Some(pointer) = self.find_touch(touch.id) {
                pointer.move_to(touch.texcoord, aspect_ratio);
            }
        }
    }

    pub fn touch_end(&mut self, ids: &[i64]) -> Vec<Event> {
        ids.iter()
            .filter_map(|id| self.find_touch(*id).and_then(Pointer::release))
            .collect()
    }

    // Consumes the moved flags, handing back the pointers that had one.
    pub fn take_moved(&mut self) -> Vec<Pointer> {
        self.pointers
            .iter_mut()
            .filter(|pointer| pointer.moved)
            .map(|pointer| {
                pointer.moved = false;
                pointer.clone()
            })
            .collect()
    }

    pub fn recolor<F>(&mut self, mut color: F)
    where
        F: FnMut() -> Rgb,
    {
        for pointer in self.pointers.iter_mut() {
            pointer.color = color();
        }
    }

    fn find_touch(&mut self, id: i64) -> Option<&mut Pointer> {
        self.pointers
            .iter_mut()
            .skip(1)
            .find(|pointer| pointer.id == PointerId::Touch(id))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    const INK: Rgb = Rgb::new(1.0, 0.0, 1.0);

    #[test]
    fn wide_canvases_halve_vertical_deltas() {
        let [dx, dy] = correct_delta([0.1, 0.1], 2.0);
        assert_relative_eq!(dx, 0.1);
        assert_relative_eq!(dy, 0.05);
    }

    #[test]
    fn tall_canvases_halve_horizontal_deltas() {
        let [dx, dy] = correct_delta([0.1, 0.1], 0.5);
        assert_relative_eq!(dx, 0.05);
        assert_relative_eq!(dy, 0.1);
    }

    #[test]
    fn pressing_resets_the_stroke() {
        let mut pointers = Pointers::default();
        pointers.mouse_down([0.25, 0.75], INK);

        let mouse = pointers.mouse();
        assert_eq!(mouse.state(), PointerState::Down);
        assert_eq!(mouse.prev_texcoord, mouse.texcoord);
        assert_eq!(mouse.delta, [0.0, 0.0]);
        assert_eq!(mouse.color, INK);
    }

    #[test]
    fn moves_are_ignored_while_up() {
        let mut pointers = Pointers::default();
        pointers.mouse_move([0.5, 0.5], 1.0);
        assert_eq!(pointers.mouse().state(), PointerState::Up);
        assert!(pointers.take_moved().is_empty());
    }

    #[test]
    fn moving_sets_a_one_shot_flag() {
        let mut pointers = Pointers::default();
        pointers.mouse_down([0.2, 0.2], INK);
        pointers.mouse_move([0.3, 0.2], 1.0);
        assert_eq!(pointers.mouse().state(), PointerState::Moving);

        let moved = pointers.take_moved();
        assert_eq!(moved.len(), 1);
        assert_relative_eq!(moved[0].delta[0], 0.1, epsilon = 1e-6);
        assert!(pointers.take_moved().is_empty());
        assert_eq!(pointers.mouse().state(), PointerState::Down);
    }

    #[test]
    fn zero_length_moves_do_not_count() {
        let mut pointers = Pointers::default();
        pointers.mouse_down([0.2, 0.2], INK);
        pointers.mouse_move([0.2, 0.2], 1.0);
        assert!(!pointers.mouse().moved);
    }

    #[test]
    fn stroke_completes_only_after_movement() {
        let mut pointers = Pointers::default();
        pointers.mouse_down([0.2, 0.2], INK);
        assert_eq!(pointers.mouse_up(), None);

        pointers.mouse_down([0.2, 0.2], INK);
        pointers.mouse_move([0.4, 0.2], 1.0);
        assert_eq!(pointers.mouse_up(), Some(Event::StrokeCompleted));
    }

    #[test]
    fn a_stroke_completes_once() {
        let mut pointers = Pointers::default();
        pointers.mouse_down([0.2, 0.2], INK);
        pointers.mouse_move([0.4, 0.2], 1.0);

        assert_eq!(pointers.mouse_up(), Some(Event::StrokeCompleted));
        assert_eq!(pointers.mouse_up(), None);
        assert_eq!(pointers.mouse().state(), PointerState::Up);
    }

    #[test]
    fn ending_a_lifted_touch_is_silent() {
        let mut pointers = Pointers::default();
        let touch = |x| Touch {
            id: 4,
            texcoord: [x, 0.5],
        };
        pointers.touch_start(&[touch(0.1)], INK);
        pointers.touch_move(&[touch(0.3)], 1.0);

        assert_eq!(pointers.touch_end(&[4]), vec![Event::StrokeCompleted]);
        assert!(pointers.touch_end(&[4]).is_empty());
    }

    #[test]
    fn touches_take_slots_after_the_mouse() {
        let mut pointers = Pointers::default();
        let touches = [
            Touch {
                id: 7,
                texcoord: [0.1, 0.1],
            },
            Touch {
                id: 9,
                texcoord: [0.9, 0.9],
            },
        ];
        pointers.touch_start(&touches, INK);
        assert_eq!(pointers.len(), 3);
        assert_eq!(pointers.mouse().id, PointerId::Mouse);

        pointers.touch_move(
            &[Touch {
                id: 9,
                texcoord: [0.8, 0.9],
            }],
            1.0,
        );
        let moved = pointers.take_moved();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].id, PointerId::Touch(9));

        assert_eq!(pointers.touch_end(&[7, 9, 42]), vec![Event::StrokeCompleted]);
        assert!(pointers.iter().all(|pointer| !pointer.down));
    }

    #[test]
    fn the_pool_is_reused() {
        let mut pointers = Pointers::default();
        let touch = [Touch {
            id: 1,
            texcoord: [0.5, 0.5],
        }];
        for _ in 0..5 {
            pointers.touch_start(&touch, INK);
            pointers.touch_end(&[1]);
        }
        assert_eq!(pointers.len(), 2);
    }

    #[test]
    fn client_coordinates_map_to_flipped_texcoords() {
        let canvas = CanvasGeometry {
            client_left: 10.0,
            client_top: 20.0,
            css_width: 400.0,
            css_height: 200.0,
            device_width: 800,
            device_height: 400,
        };
        let [x, y] = canvas.texcoord(110.0, 70.0);
        assert_relative_eq!(x, 0.25);
        assert_relative_eq!(y, 0.75);
        assert_relative_eq!(canvas.aspect_ratio(), 2.0);
    }

    #[test]
    fn resizing_the_drawing_buffer_keeps_the_page_placement() {
        let canvas = CanvasGeometry {
            client_left: 10.0,
            client_top: 20.0,
            css_width: 400.0,
            css_height: 200.0,
            device_width: 800,
            device_height: 400,
        }
        .with_device_size(1600, 800);

        assert_relative_eq!(canvas.client_left, 10.0);
        assert_relative_eq!(canvas.client_top, 20.0);
        assert_relative_eq!(canvas.css_width, 400.0);
        assert_relative_eq!(canvas.css_height, 200.0);
        assert_eq!((canvas.device_width, canvas.device_height), (1600, 800));

        let [x, y] = canvas.texcoord(110.0, 70.0);
        assert_relative_eq!(x, 0.25);
        assert_relative_eq!(y, 0.75);
    }

    #[test]
    fn recoloring_reaches_every_pointer() {
        let mut pointers = Pointers::default();
        pointers.touch_start(
            &[Touch {
                id: 3,
                texcoord: [0.5, 0.5],
            }],
            INK,
        );
        pointers.recolor(|| Rgb::WHITE);
        assert!(pointers.iter().all(|pointer| pointer.color == Rgb::WHITE));
    }
}
