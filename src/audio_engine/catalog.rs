//! Sound catalog of one game segment.
//!
//! A [`SoundCatalog`] maps logical sound identifiers to loaded slots. It is built completely on
//! the game-logic thread and then handed to the mixer as a whole, so the audio thread only ever
//! sees finished catalogs.

use std::collections::HashMap;
use std::sync::Arc;

use crate::audio_engine::audio_spec::AudioSpec;
use crate::audio_engine::errors::SoundLoadError;
use crate::audio_engine::sound_slot::{SoundSlot, SoundSource};
use crate::messages::SoundId;

#[derive(Debug, Default)]
pub struct SoundCatalog {
    slot_map: HashMap<SoundId, usize>,
    slots: Vec<Arc<SoundSlot>>,
    /// Hardware-accelerated variant per slot index.
    variants: Vec<Option<Arc<SoundSlot>>>,
}

impl SoundCatalog {
    /// Creates a catalog from an identifier map and the slots it points into.
    pub fn new(slot_map: HashMap<SoundId, usize>, slots: Vec<SoundSlot>) -> Self {
        let variants = vec![None; slots.len()];
        Self {
            slot_map,
            slots: slots.into_iter().map(Arc::new).collect(),
            variants,
        }
    }

    /// Loads every `(id, name)` pair from `source`.
    ///
    /// The container is read once. A sound that fails to load leaves an empty slot behind and
    /// is logged; only an unreadable container fails the whole catalog.
    pub fn load(
        source: &SoundSource,
        sounds: &[(SoundId, &str)],
        spec: &AudioSpec,
    ) -> Result<Self, SoundLoadError> {
        let path = source.container_path();
        let container = std::fs::read(&path).inspect_err(|err| {
            log::warn!("Sounds file '{}' unopenable: {err}", path.display());
        })?;

        let mut catalog = Self::default();
        for &(id, name) in sounds {
            let slot = SoundSlot::load_from_container(&source.game_dir, &container, name, spec)
                .unwrap_or_else(|_| SoundSlot::empty());
            catalog.insert(id, slot);
        }

        log::info!(
            "Loaded {} of {} sounds from {}",
            catalog.slots.iter().filter(|slot| slot.is_loaded()).count(),
            sounds.len(),
            path.display()
        );

        Ok(catalog)
    }

    /// Appends `slot` and maps `id` to it, replacing any previous mapping for `id`.
    pub fn insert(&mut self, id: SoundId, slot: SoundSlot) -> usize {
        let index = self.slots.len();
        self.slots.push(Arc::new(slot));
        self.variants.push(None);
        self.slot_map.insert(id, index);
        index
    }

    /// Registers the hardware-accelerated variant of the sound `id`.
    ///
    /// Returns false if `id` is not mapped.
    pub fn insert_variant(&mut self, id: SoundId, slot: SoundSlot) -> bool {
        let Some(&index) = self.slot_map.get(&id) else {
            return false;
        };
        match self.variants.get_mut(index) {
            Some(variant) => {
                *variant = Some(Arc::new(slot));
                true
            }
            None => false,
        }
    }

    /// Returns a copy of the catalog with every slot converted from `from` to `to`.
    ///
    /// A slot that cannot be converted is left empty and logged.
    pub fn convert(&self, from: &AudioSpec, to: &AudioSpec) -> Self {
        let convert_slot = |slot: &Arc<SoundSlot>| {
            let converted = slot.convert(from, to).unwrap_or_else(|err| {
                log::warn!("Sound could not be converted to the new output format: {err}");
                SoundSlot::empty()
            });
            Arc::new(converted)
        };

        Self {
            slot_map: self.slot_map.clone(),
            slots: self.slots.iter().map(convert_slot).collect(),
            variants: self
                .variants
                .iter()
                .map(|variant| variant.as_ref().map(convert_slot))
                .collect(),
        }
    }

    pub fn slot_index(&self, id: SoundId) -> Option<usize> {
        self.slot_map.get(&id).copied()
    }

    pub fn slot(&self, index: usize) -> Option<&Arc<SoundSlot>> {
        self.slots.get(index)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn has_variant(&self, id: SoundId) -> bool {
        self.slot_index(id)
            .and_then(|index| self.variants.get(index))
            .is_some_and(|variant| variant.as_ref().is_some_and(|slot| slot.is_loaded()))
    }

    /// Resolves `id` to the slot that should play.
    ///
    /// With `prefer_variant` set, a loaded hardware-accelerated variant replaces the regular
    /// slot. Returns `None` for unmapped identifiers and for slots without audio.
    pub fn resolve(&self, id: SoundId, prefer_variant: bool) -> Option<Arc<SoundSlot>> {
        let index = self.slot_index(id)?;

        if prefer_variant {
            if let Some(Some(variant)) = self.variants.get(index) {
                if variant.is_loaded() {
                    return Some(Arc::clone(variant));
                }
            }
        }

        self.slots
            .get(index)
            .filter(|slot| slot.is_loaded())
            .cloned()
    }
}
