use crate::color::Rgb;
use crate::settings::Mode;

use serde::Serialize;

/// Notifications for whoever hosts the canvas: a guided tour, an export
/// button, analytics.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    /// A pointer was lifted after actually moving.
    StrokeCompleted,
    ColorChanged { color: Rgb },
    ExportRequested,
    SplatRequested { count: u32 },
    ModeChanged { mode: Mode },
}

type Subscriber = Box<dyn FnMut(&Event)>;

#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
}

impl EventBus {
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&Event) + 'static,
    {
        self.subscribers.push(Box::new(callback));
    }

    // Delivers to every subscriber, in the order they subscribed.
    pub fn emit(&mut self, event: Event) {
        log::debug!("{:?}", event);

        for subscriber in self.subscribers.iter_mut() {
            subscriber(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn subscribers_are_called_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::default();

        for name in ["tour", "export"] {
            let log = Rc::clone(&log);
            bus.subscribe(move |event| log.borrow_mut().push((name, event.clone())));
        }

        bus.emit(Event::StrokeCompleted);
        bus.emit(Event::SplatRequested { count: 7 });

        assert_eq!(
            *log.borrow(),
            vec![
                ("tour", Event::StrokeCompleted),
                ("export", Event::StrokeCompleted),
                ("tour", Event::SplatRequested { count: 7 }),
                ("export", Event::SplatRequested { count: 7 }),
            ]
        );
    }

    #[test]
    fn emitting_without_subscribers_is_fine() {
        let mut bus = EventBus::default();
        assert!(bus.is_empty());
        bus.emit(Event::ExportRequested);
    }

    #[test]
    fn events_serialize_with_a_type_tag() {
        let json = serde_json::to_value(Event::ModeChanged {
            mode: Mode::Flowing,
        })
        .unwrap();
        assert_eq!(json["type"], "modeChanged");
        assert_eq!(json["mode"], "Flowing");

        let json = serde_json::to_value(Event::ColorChanged {
            color: Rgb::from_u8(255, 0, 255),
        })
        .unwrap();
        assert_eq!(json["color"], "#FF00FF");
    }
}
