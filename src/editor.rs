//! Pointer-driven layer editing on a scaled proxy of a slot's canvas.
//!
//! The proxy is what the user sees; every delta is divided by the proxy zoom before it reaches
//! the store, so layer transforms stay in canonical slot pixels whatever the on-screen size.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::foundation::core::{CanvasSize, Point, Vec2};
use crate::foundation::error::{LiveryError, LiveryResult};
use crate::scene::model::{LayerId, LayerPatch, LayerScale, SlotName};
use crate::slots::store::{LayerReady, SlotStore};

/// Smallest scale factor a resize can produce.
pub const MIN_SCALE: f64 = 0.01;

/// Editor selection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Selection {
    /// Nothing selected.
    #[default]
    None,
    /// Selected, but the layer has no processed bitmap yet so it cannot be manipulated.
    Pending(LayerId),
    /// Selected and manipulable.
    Attached(LayerId),
}

impl Selection {
    /// Selected layer, attached or not.
    pub fn layer(&self) -> Option<&LayerId> {
        match self {
            Self::None => None,
            Self::Pending(id) | Self::Attached(id) => Some(id),
        }
    }
}

/// Editing session for one slot.
#[derive(Debug)]
pub struct LayerEditor {
    store: SlotStore,
    slot: SlotName,
    canvas: CanvasSize,
    zoom: f64,
    selection: Selection,
    ready_rx: broadcast::Receiver<LayerReady>,
}

impl LayerEditor {
    /// Editor showing `slot` at `proxy_width` on-screen pixels.
    pub fn new(store: SlotStore, slot: SlotName, proxy_width: f64) -> LiveryResult<Self> {
        if !(proxy_width.is_finite() && proxy_width > 0.0) {
            return Err(LiveryError::validation(format!(
                "proxy width must be > 0, got {proxy_width}"
            )));
        }
        let canvas = store.canvas(&slot)?;
        let ready_rx = store.subscribe_ready(&slot)?;
        Ok(Self {
            zoom: proxy_width / f64::from(canvas.width),
            store,
            slot,
            canvas,
            selection: Selection::None,
            ready_rx,
        })
    }

    /// Slot being edited.
    pub fn slot(&self) -> &SlotName {
        &self.slot
    }

    /// Proxy pixels per canonical pixel.
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Canonical canvas size.
    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    /// Current selection.
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Proxy point to canonical slot space.
    pub fn to_canonical(&self, proxy: Point) -> Point {
        Point::new(proxy.x / self.zoom, proxy.y / self.zoom)
    }

    /// Canonical point to proxy space.
    pub fn to_proxy(&self, canonical: Point) -> Point {
        Point::new(canonical.x * self.zoom, canonical.y * self.zoom)
    }

    /// Select a layer. It attaches right away when its bitmap is ready, otherwise it stays
    /// pending until the matching [`LayerReady`] arrives.
    pub fn select(&mut self, id: &LayerId) -> LiveryResult<&Selection> {
        self.store.layer(&self.slot, id)?;
        self.selection = match self.store.bitmap_size(&self.slot, id)? {
            Some(_) => Selection::Attached(id.clone()),
            None => {
                tracing::debug!(slot = %self.slot, layer = %id, "selection pending until bitmap is ready");
                Selection::Pending(id.clone())
            }
        };
        Ok(&self.selection)
    }

    /// Clear the selection.
    pub fn deselect(&mut self) {
        self.selection = Selection::None;
    }

    /// Drain readiness events without waiting. Returns the layer that became attached, if any.
    pub fn poll_ready(&mut self) -> Option<LayerId> {
        loop {
            match self.ready_rx.try_recv() {
                Ok(ev) => {
                    if let Some(id) = self.on_ready(&ev) {
                        return Some(id);
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(slot = %self.slot, skipped, "readiness events lagged");
                    if let Some(id) = self.recheck_pending() {
                        return Some(id);
                    }
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return self.recheck_pending(),
            }
        }
    }

    /// Wait until the pending selection attaches.
    ///
    /// Returns `None` right away when nothing is pending, or when the pending layer was removed.
    pub async fn wait_attached(&mut self) -> Option<LayerId> {
        loop {
            let Selection::Pending(_) = &self.selection else {
                return None;
            };
            if let Some(id) = self.recheck_pending() {
                return Some(id);
            }
            match self.ready_rx.recv().await {
                Ok(ev) => {
                    if let Some(id) = self.on_ready(&ev) {
                        return Some(id);
                    }
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return None,
            }
        }
    }

    fn on_ready(&mut self, ev: &LayerReady) -> Option<LayerId> {
        match &self.selection {
            Selection::Pending(id) if id == &ev.layer && ev.slot == self.slot => {
                let id = id.clone();
                self.selection = Selection::Attached(id.clone());
                Some(id)
            }
            _ => None,
        }
    }

    // Covers events that fired before the subscription caught up, and layers that vanished.
    fn recheck_pending(&mut self) -> Option<LayerId> {
        let Selection::Pending(id) = &self.selection else {
            return None;
        };
        let id = id.clone();
        match self.store.bitmap_size(&self.slot, &id) {
            Ok(Some(_)) => {
                self.selection = Selection::Attached(id.clone());
                Some(id)
            }
            Ok(None) => None,
            Err(_) => {
                self.selection = Selection::None;
                None
            }
        }
    }

    fn attached(&self) -> LiveryResult<LayerId> {
        match &self.selection {
            Selection::Attached(id) => Ok(id.clone()),
            Selection::Pending(id) => Err(LiveryError::validation(format!(
                "layer {id} is not ready for editing yet"
            ))),
            Selection::None => Err(LiveryError::validation("no layer selected")),
        }
    }

    fn patch(&mut self, patch: LayerPatch) -> LiveryResult<bool> {
        let id = self.attached()?;
        let res = self.store.update_layer(&self.slot, &id, patch);
        if res.is_err() && self.store.layer(&self.slot, &id).is_err() {
            self.selection = Selection::None;
        }
        res
    }

    /// Move the selected layer by a proxy-space pointer delta.
    pub fn drag_by(&mut self, proxy_delta: Vec2) -> LiveryResult<bool> {
        let id = self.attached()?;
        let layer = self.store.layer(&self.slot, &id)?;
        let p = layer.position + proxy_delta / self.zoom;
        self.patch(LayerPatch::position(p.x, p.y))
    }

    /// Move the selected layer by whole canonical pixels.
    pub fn nudge(&mut self, dx: f64, dy: f64) -> LiveryResult<bool> {
        let id = self.attached()?;
        let layer = self.store.layer(&self.slot, &id)?;
        self.patch(LayerPatch::position(
            layer.position.x + dx,
            layer.position.y + dy,
        ))
    }

    /// Resize from a corner handle dragged by a proxy-space delta, keeping the center fixed.
    ///
    /// The delta is taken in the layer's rotated frame; `uniform` keeps the aspect ratio.
    pub fn resize_by(&mut self, proxy_delta: Vec2, uniform: bool) -> LiveryResult<bool> {
        let id = self.attached()?;
        let layer = self.store.layer(&self.slot, &id)?;
        let (bw, bh) = self
            .store
            .bitmap_size(&self.slot, &id)?
            .ok_or_else(|| LiveryError::validation(format!("layer {id} has no bitmap")))?;

        let d = proxy_delta / self.zoom;
        let (sin, cos) = (-layer.rotation_deg.to_radians()).sin_cos();
        let local = Vec2::new(d.x * cos - d.y * sin, d.x * sin + d.y * cos);

        let w = f64::from(bw) * layer.scale.x;
        let h = f64::from(bh) * layer.scale.y;
        let mut fx = (w + 2.0 * local.x) / w;
        let mut fy = (h + 2.0 * local.y) / h;
        if uniform {
            let f = (fx + fy) / 2.0;
            fx = f;
            fy = f;
        }
        let scale = LayerScale {
            x: (layer.scale.x * fx).max(MIN_SCALE),
            y: (layer.scale.y * fy).max(MIN_SCALE),
        };
        self.patch(LayerPatch {
            scale: Some(scale),
            ..LayerPatch::default()
        })
    }

    /// Rotate the selected layer by `degrees`, clockwise.
    pub fn rotate_by(&mut self, degrees: f64) -> LiveryResult<bool> {
        let id = self.attached()?;
        let layer = self.store.layer(&self.slot, &id)?;
        self.patch(LayerPatch {
            rotation_deg: Some((layer.rotation_deg + degrees).rem_euclid(360.0)),
            ..LayerPatch::default()
        })
    }

    /// Point the selected layer's rotation handle (straight up at rest) at a proxy position.
    pub fn rotate_towards(&mut self, proxy: Point) -> LiveryResult<bool> {
        let id = self.attached()?;
        let layer = self.store.layer(&self.slot, &id)?;
        let d = self.to_canonical(proxy) - layer.position;
        if d.hypot2() == 0.0 {
            return Ok(false);
        }
        let deg = d.x.atan2(-d.y).to_degrees().rem_euclid(360.0);
        self.patch(LayerPatch {
            rotation_deg: Some(deg),
            ..LayerPatch::default()
        })
    }

    /// Topmost layer with a ready bitmap under a proxy point.
    pub fn layer_at(&self, proxy: Point) -> LiveryResult<Option<LayerId>> {
        let p = self.to_canonical(proxy);
        let mut layers = self.store.layers(&self.slot)?;
        layers.sort_by_key(|l| l.z_index);

        for layer in layers.iter().rev() {
            let Some((bw, bh)) = self.store.bitmap_size(&self.slot, &layer.id)? else {
                continue;
            };
            let local = layer.transform(bw, bh).inverse() * p;
            if (0.0..f64::from(bw)).contains(&local.x) && (0.0..f64::from(bh)).contains(&local.y)
            {
                return Ok(Some(layer.id.clone()));
            }
        }
        Ok(None)
    }

    /// Select whatever is under the pointer, or clear the selection when nothing is.
    pub fn pick(&mut self, proxy: Point) -> LiveryResult<&Selection> {
        match self.layer_at(proxy)? {
            Some(id) => self.select(&id),
            None => {
                self.deselect();
                Ok(&self.selection)
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/editor.rs"]
mod tests;
