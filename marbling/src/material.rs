// Lazily compiled shader variants.
//
// A material pairs the shared vertex stage with one fragment source and
// compiles a separate program for every keyword combination it is asked for.
// Keywords are a closed set, so every variant a pass can request is known at
// compile time.

use crate::render::{Context, Program};

use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Keyword {
    // Bilinear filtering done by hand in the shader, for devices that cannot
    // linearly filter half-float textures.
    ManualFiltering,
    // The paint program writes still water into the velocity field instead of
    // compositing ink into the dye field.
    PaintVelocity,
}

impl Keyword {
    pub const ALL: [Keyword; 2] = [Keyword::ManualFiltering, Keyword::PaintVelocity];

    pub fn define(&self) -> &'static str {
        match self {
            Keyword::ManualFiltering => "MANUAL_FILTERING",
            Keyword::PaintVelocity => "PAINT_VELOCITY",
        }
    }

    fn bit(&self) -> u32 {
        1 << (*self as u32)
    }
}

/// An order-independent set of keywords. Doubles as the cache key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct KeywordSet(u32);

impl KeywordSet {
    pub const EMPTY: KeywordSet = KeywordSet(0);

    pub fn with(self, keyword: Keyword) -> Self {
        KeywordSet(self.0 | keyword.bit())
    }

    pub fn with_if(self, keyword: Keyword, condition: bool) -> Self {
        if condition {
            self.with(keyword)
        } else {
            self
        }
    }

    pub fn contains(&self, keyword: Keyword) -> bool {
        self.0 & keyword.bit() != 0
    }

    pub fn defines(&self) -> Vec<&'static str> {
        Keyword::ALL
            .iter()
            .filter(|keyword| self.contains(**keyword))
            .map(Keyword::define)
            .collect()
    }
}

impl FromIterator<Keyword> for KeywordSet {
    fn from_iter<I: IntoIterator<Item = Keyword>>(iter: I) -> Self {
        iter.into_iter().fold(KeywordSet::EMPTY, KeywordSet::with)
    }
}

pub struct Material {
    context: Context,
    label: &'static str,
    shaders: (&'static str, &'static str),
    // `None` marks a variant that failed to compile or link. It is never
    // retried.
    programs: RefCell<FxHashMap<KeywordSet, Option<Rc<Program>>>>,
    active: Cell<KeywordSet>,
}

impl Material {
    pub fn new(
        context: &Context,
        label: &'static str,
        shaders: (&'static str, &'static str),
    ) -> Self {
        Self {
            context: Rc::clone(context),
            label,
            shaders,
            programs: RefCell::new(FxHashMap::default()),
            active: Cell::new(KeywordSet::EMPTY),
        }
    }

    pub fn with_keywords(self, keywords: KeywordSet) -> Self {
        self.set_keywords(keywords);
        self
    }

    pub fn program(&self, keywords: KeywordSet) -> Option<Rc<Program>> {
        if let Some(cached) = self.programs.borrow().get(&keywords) {
            return cached.clone();
        }

        let program = match Program::new_with_defines(
            &self.context,
            self.shaders,
            &keywords.defines(),
        ) {
            Ok(program) => Some(Rc::new(program)),
            Err(problem) => {
                log::error!(
                    "Failed to build the {} program {:?}: {}",
                    self.label,
                    keywords.defines(),
                    problem
                );
                None
            }
        };

        self.programs
            .borrow_mut()
            .insert(keywords, program.clone());
        program
    }

    pub fn set_keywords(&self, keywords: KeywordSet) {
        self.active.set(keywords);
    }

    // Activates the selected variant. Returns `None` when that variant is
    // unusable, in which case the caller skips its draw.
    pub fn bind(&self) -> Option<Rc<Program>> {
        let program = self.program(self.active.get())?;
        program.use_program();
        Some(program)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keyword_sets_ignore_order() {
        let a: KeywordSet = [Keyword::ManualFiltering, Keyword::PaintVelocity]
            .into_iter()
            .collect();
        let b: KeywordSet = [Keyword::PaintVelocity, Keyword::ManualFiltering]
            .into_iter()
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn repeated_keywords_collapse() {
        let set = KeywordSet::EMPTY
            .with(Keyword::ManualFiltering)
            .with(Keyword::ManualFiltering);
        assert_eq!(set, KeywordSet::EMPTY.with(Keyword::ManualFiltering));
        assert_eq!(set.defines(), vec!["MANUAL_FILTERING"]);
    }

    #[test]
    fn empty_set_has_no_defines() {
        assert!(KeywordSet::EMPTY.defines().is_empty());
        assert!(!KeywordSet::EMPTY.contains(Keyword::PaintVelocity));
    }

    #[test]
    fn conditional_keywords() {
        let linear = KeywordSet::EMPTY.with_if(Keyword::ManualFiltering, false);
        let manual = KeywordSet::EMPTY.with_if(Keyword::ManualFiltering, true);
        assert_ne!(linear, manual);
        assert!(manual.contains(Keyword::ManualFiltering));
    }

    #[test]
    fn defines_are_listed_in_declaration_order() {
        let set = KeywordSet::EMPTY
            .with(Keyword::PaintVelocity)
            .with(Keyword::ManualFiltering);
        assert_eq!(set.defines(), vec!["MANUAL_FILTERING", "PAINT_VELOCITY"]);
    }
}
