//! Device buffers for one grid size, their roles, and host readback.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use bytemuck::Pod;
use glam::Vec2;

use super::kernels::{Kernel, Kernels};
use crate::error::{AllocError, FluidError, Result, Stage};
use crate::field::{Field, GridSize, Texel};

/// Index of a storage buffer in [`Resources::buffers`].
pub(crate) type Slot = usize;

/// Two buffer slots with alternating read/write roles.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SlotPair {
    slots: [Slot; 2],
    read: usize,
}

impl SlotPair {
    fn new(a: Slot, b: Slot) -> Self {
        Self {
            slots: [a, b],
            read: 0,
        }
    }

    pub(crate) fn read(&self) -> Slot {
        self.slots[self.read]
    }

    pub(crate) fn write(&self) -> Slot {
        self.slots[1 - self.read]
    }

    pub(crate) fn read_mut(&mut self) -> &mut Slot {
        &mut self.slots[self.read]
    }

    pub(crate) fn write_mut(&mut self) -> &mut Slot {
        &mut self.slots[1 - self.read]
    }

    pub(crate) fn swap(&mut self) {
        self.read = 1 - self.read;
    }
}

/// Which buffer plays which part this frame.
///
/// Plain indices: a frame is encoded against a copy and committed by
/// assigning the copy back once the device accepted it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Roles {
    pub velocity: Slot,
    pub pressure: Slot,
    pub dye: Slot,
    pub velocity_work: SlotPair,
    pub velocity_aux: SlotPair,
    pub pressure_work: SlotPair,
    pub divergence: Slot,
    /// One f32: the mean removed from the solved pressure.
    pub pressure_mean: Slot,
    pub dye_work: SlotPair,
    pub dye_aux: SlotPair,
}

/// Buffers shared by every grid size.
pub(crate) struct Uniforms {
    pub params: wgpu::Buffer,
    pub splats: wgpu::Buffer,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BindKey {
    kernel: Kernel,
    slots: Vec<(u32, Slot)>,
}

struct Staging {
    velocity: wgpu::Buffer,
    pressure: wgpu::Buffer,
    dye: wgpu::Buffer,
}

/// Host copy of the committed state.
pub(crate) struct Mirror {
    pub velocity: Field<Vec2>,
    pub pressure: Field<f32>,
    pub dye: Field<f32>,
    pub stale: bool,
}

pub(crate) struct Resources {
    pub size: GridSize,
    pub roles: Roles,
    pub mirror: Mirror,
    buffers: Vec<wgpu::Buffer>,
    staging: Staging,
    bind_groups: HashMap<BindKey, wgpu::BindGroup>,
}

fn byte_len<T>(size: GridSize, resource: &'static str, limit: u64) -> Result<u64> {
    let cells = size.cells();
    let bytes = cells
        .checked_mul(std::mem::size_of::<T>())
        .ok_or_else(|| {
            FluidError::allocation(
                resource,
                size.width,
                size.height,
                AllocError::Overflow(cells),
            )
        })?;
    let bytes = bytes as u64;
    if bytes > limit {
        return Err(FluidError::allocation(
            resource,
            size.width,
            size.height,
            AllocError::Device(format!("{bytes} bytes exceeds the {limit} byte binding limit")),
        ));
    }
    Ok(bytes)
}

fn mirror_field<T: Texel>(size: GridSize, resource: &'static str) -> Result<Field<T>> {
    Field::zeroed(size).map_err(|e| FluidError::allocation(resource, size.width, size.height, e))
}

impl Resources {
    /// Creates every buffer for `size`. Device out-of-memory is reported
    /// through the caller's error scope, not here.
    pub(crate) fn allocate(device: &wgpu::Device, size: GridSize) -> Result<Self> {
        let limit = u64::from(device.limits().max_storage_buffer_binding_size);
        let vec2_bytes = byte_len::<Vec2>(size, "velocity", limit)?;
        let f32_bytes = byte_len::<f32>(size, "scalar field", limit)?;

        let mut buffers = Vec::new();
        let mut storage = |label: &'static str, bytes: u64| -> Slot {
            buffers.push(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: bytes,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
            buffers.len() - 1
        };

        let roles = Roles {
            velocity: storage("velocity", vec2_bytes),
            pressure: storage("pressure", f32_bytes),
            dye: storage("dye", f32_bytes),
            velocity_work: SlotPair::new(
                storage("velocity-a", vec2_bytes),
                storage("velocity-b", vec2_bytes),
            ),
            velocity_aux: SlotPair::new(
                storage("velocity-aux-a", vec2_bytes),
                storage("velocity-aux-b", vec2_bytes),
            ),
            pressure_work: SlotPair::new(
                storage("pressure-a", f32_bytes),
                storage("pressure-b", f32_bytes),
            ),
            divergence: storage("divergence", f32_bytes),
            pressure_mean: storage("pressure-mean", std::mem::size_of::<f32>() as u64),
            dye_work: SlotPair::new(storage("dye-a", f32_bytes), storage("dye-b", f32_bytes)),
            dye_aux: SlotPair::new(
                storage("dye-aux-a", f32_bytes),
                storage("dye-aux-b", f32_bytes),
            ),
        };

        let readback = |label: &'static str, bytes: u64| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: bytes,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            })
        };
        let staging = Staging {
            velocity: readback("velocity-read", vec2_bytes),
            pressure: readback("pressure-read", f32_bytes),
            dye: readback("dye-read", f32_bytes),
        };

        let mirror = Mirror {
            velocity: mirror_field(size, "velocity readback")?,
            pressure: mirror_field(size, "pressure readback")?,
            dye: mirror_field(size, "dye readback")?,
            stale: false,
        };

        Ok(Self {
            size,
            roles,
            mirror,
            buffers,
            staging,
            bind_groups: HashMap::new(),
        })
    }

    pub(crate) fn buffer(&self, slot: Slot) -> &wgpu::Buffer {
        &self.buffers[slot]
    }

    /// Cached bind group for `kernel` with `slots` at the given bindings.
    pub(crate) fn bind_group(
        &mut self,
        device: &wgpu::Device,
        kernels: &Kernels,
        uniforms: &Uniforms,
        kernel: Kernel,
        slots: &[(u32, Slot)],
    ) -> &wgpu::BindGroup {
        let key = BindKey {
            kernel,
            slots: slots.to_vec(),
        };
        match self.bind_groups.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mut entries = vec![wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.params.as_entire_binding(),
                }];
                if kernel.uses_splats() {
                    entries.push(wgpu::BindGroupEntry {
                        binding: 3,
                        resource: uniforms.splats.as_entire_binding(),
                    });
                }
                entries.extend(slots.iter().map(|&(binding, slot)| wgpu::BindGroupEntry {
                    binding,
                    resource: self.buffers[slot].as_entire_binding(),
                }));
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(kernel.label()),
                    layout: &kernels.get(kernel).get_bind_group_layout(0),
                    entries: &entries,
                });
                entry.insert(bind_group)
            }
        }
    }

    /// Copies the committed buffers into the host mirror.
    pub(crate) fn read_back(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<()> {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback"),
        });
        let copies = [
            (self.roles.velocity, &self.staging.velocity),
            (self.roles.pressure, &self.staging.pressure),
            (self.roles.dye, &self.staging.dye),
        ];
        for (slot, staging) in copies {
            encoder.copy_buffer_to_buffer(&self.buffers[slot], 0, staging, 0, staging.size());
        }
        queue.submit(Some(encoder.finish()));

        copy_mapped(device, &self.staging.velocity, self.mirror.velocity.data_mut())?;
        copy_mapped(device, &self.staging.pressure, self.mirror.pressure.data_mut())?;
        copy_mapped(device, &self.staging.dye, self.mirror.dye.data_mut())?;
        self.mirror.stale = false;
        Ok(())
    }
}

fn readback_error(message: impl Into<String>) -> FluidError {
    FluidError::Device {
        stage: Stage::Readback,
        message: message.into(),
    }
}

fn map_wait(device: &wgpu::Device, slice: &wgpu::BufferSlice<'_>) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |r| {
        let _ = tx.send(r);
    });
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|e| readback_error(e.to_string()))?;
    rx.recv()
        .map_err(|_| readback_error("map_async channel closed"))?
        .map_err(|e| readback_error(e.to_string()))
}

fn copy_mapped<T: Pod>(device: &wgpu::Device, buffer: &wgpu::Buffer, out: &mut [T]) -> Result<()> {
    let slice = buffer.slice(..);
    map_wait(device, &slice)?;
    {
        let mapped = slice.get_mapped_range();
        out.copy_from_slice(bytemuck::cast_slice(&mapped));
    }
    buffer.unmap();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_pair_swaps_roles() {
        let mut pair = SlotPair::new(3, 7);
        assert_eq!((pair.read(), pair.write()), (3, 7));
        pair.swap();
        assert_eq!((pair.read(), pair.write()), (7, 3));
        *pair.read_mut() = 9;
        assert_eq!((pair.read(), pair.write()), (9, 3));
    }

    #[test]
    fn oversized_grids_are_rejected_before_touching_the_device() {
        let err = byte_len::<Vec2>(GridSize::new(4096, 4096), "velocity", 1 << 20).unwrap_err();
        assert!(matches!(
            err,
            FluidError::Allocation {
                source: AllocError::Device(_),
                ..
            }
        ));
        assert_eq!(byte_len::<f32>(GridSize::new(16, 8), "dye", 1 << 20).unwrap(), 512);
    }
}
