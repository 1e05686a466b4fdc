//! OpenCL substrate.
//!
//! Device memory goes through a typestate wrapper: a buffer is `Queued` after
//! allocation, `InFlight` while a host transfer is pending and `Ready` once
//! the transfer event has completed. Only `Ready` buffers take part in a step.

use opencl3::{
    command_queue::{CommandQueue, CL_QUEUE_PROFILING_ENABLE},
    context::Context,
    device::Device,
    event::Event,
    kernel::Kernel,
    memory::{Buffer, CL_MEM_READ_WRITE},
    program::Program,
    types::{cl_device_id, cl_uint, CL_BLOCKING, CL_NON_BLOCKING},
};
use std::{marker::PhantomData, ptr};

use bytemuck::{cast_slice, cast_slice_mut};

use crate::body::Float4;
use crate::device::device_name;
use crate::integrator::ForceIntegrator;
use crate::params::SimulationParameters;
use crate::NBodyError;

pub const NBODY_KERNEL_SRC: &str = include_str!("../kernels/nbody.cl");
const KERNEL_NAME: &str = "nbody";

// ─── Typ‑State‑Marker ────────────────────────────────────────────────
mod sealed {
    pub trait Sealed {}
}

pub trait State: sealed::Sealed {}

pub struct Queued;
impl sealed::Sealed for Queued {}
impl State for Queued {}

pub struct InFlight;
impl sealed::Sealed for InFlight {}
impl State for InFlight {}

pub struct Ready;
impl sealed::Sealed for Ready {}
impl State for Ready {}

// ─── GPU‑Buffer Wrapper ──────────────────────────────────────────────
pub struct GpuBuffer<S: State> {
    buf: Buffer<u8>,
    len: usize,
    _state: PhantomData<S>,
}

impl<S: State> GpuBuffer<S> {
    #[inline(always)]
    fn into_state<T: State>(self) -> GpuBuffer<T> {
        GpuBuffer { buf: self.buf, len: self.len, _state: PhantomData }
    }

    #[inline(always)]
    pub fn raw(&self) -> &Buffer<u8> {
        &self.buf
    }

    /// Size in bytes.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl GpuBuffer<Queued> {
    /// Allocates `len` bytes of device memory, not yet initialised.
    pub fn new(context: &Context, len: usize) -> Result<Self, NBodyError> {
        if len == 0 {
            return Err(NBodyError::InvalidSize(len));
        }
        let buf = unsafe { Buffer::<u8>::create(context, CL_MEM_READ_WRITE, len, ptr::null_mut())? };
        Ok(Self { buf, len, _state: PhantomData })
    }

    /// Starts a non-blocking host → device copy. The guard borrows `host`
    /// until the copy has completed.
    pub fn enqueue_write<'h>(
        mut self,
        queue: &CommandQueue,
        host: &'h [u8],
    ) -> Result<(GpuBuffer<InFlight>, GpuEventGuard<'h>), NBodyError> {
        if host.len() != self.len {
            return Err(NBodyError::LengthMismatch { expected: self.len, actual: host.len() });
        }
        let evt = unsafe { queue.enqueue_write_buffer(&mut self.buf, CL_NON_BLOCKING, 0, host, &[])? };
        Ok((self.into_state(), GpuEventGuard::new(evt)))
    }

    /// Allocation and upload in one go.
    pub fn from_slice(context: &Context, queue: &CommandQueue, host: &[u8]) -> Result<GpuBuffer<Ready>, NBodyError> {
        let (in_flight, guard) = Self::new(context, host.len())?.enqueue_write(queue, host)?;
        in_flight.into_ready(guard)
    }
}

impl GpuBuffer<InFlight> {
    /// Waits for the transfer and moves to `Ready`.
    pub fn into_ready(self, guard: GpuEventGuard<'_>) -> Result<GpuBuffer<Ready>, NBodyError> {
        guard.wait()?;
        Ok(self.into_state())
    }
}

impl GpuBuffer<Ready> {
    /// Blocking device → host copy.
    pub fn read_blocking(&self, queue: &CommandQueue, host: &mut [u8]) -> Result<(), NBodyError> {
        if host.len() != self.len {
            return Err(NBodyError::LengthMismatch { expected: self.len, actual: host.len() });
        }
        unsafe { queue.enqueue_read_buffer(&self.buf, CL_BLOCKING, 0, host, &[])? };
        Ok(())
    }
}

// ── Guard (wartet bei Drop auf Event) ────────────────────────────────
pub struct GpuEventGuard<'h> {
    evt: Option<Event>,
    _host: PhantomData<&'h [u8]>,
}

impl GpuEventGuard<'_> {
    fn new(evt: Event) -> Self {
        Self { evt: Some(evt), _host: PhantomData }
    }

    pub fn wait(mut self) -> Result<(), NBodyError> {
        match self.evt.take() {
            Some(evt) => Ok(evt.wait()?),
            None => Ok(()),
        }
    }
}

impl Drop for GpuEventGuard<'_> {
    fn drop(&mut self) {
        if let Some(evt) = self.evt.take() {
            let _ = evt.wait();
        }
    }
}

// ─── Integrator ──────────────────────────────────────────────────────

/// One work item per body; `count` must be a multiple of `wgsize`.
pub struct ClIntegrator {
    context: Context,
    queue: CommandQueue,
    kernel: Kernel,
    device_name: String,
    wgsize: usize,
}

impl ClIntegrator {
    pub fn new(device_id: cl_device_id, params: &SimulationParameters) -> Result<Self, NBodyError> {
        if params.count == 0 || params.wgsize == 0 || params.count % params.wgsize != 0 {
            return Err(NBodyError::InvalidWorkGroup { count: params.count, wgsize: params.wgsize });
        }

        /* ---------- OpenCL-Setup ---------- */
        let device = Device::new(device_id);
        let device_name = device_name(&device)?;
        let context = Context::from_device(&device)?;
        let queue = CommandQueue::create(&context, device.id(), CL_QUEUE_PROFILING_ENABLE)?;

        /* ---------- Kernel bauen ---------- */
        let options = params.kernel_options();
        log::info!("building '{KERNEL_NAME}' for {device_name} with `{options}`");
        let program = Program::create_and_build_from_source(&context, NBODY_KERNEL_SRC, &options)
            .map_err(NBodyError::Build)?;
        let kernel = Kernel::create(&program, KERNEL_NAME)?;

        Ok(Self { context, queue, kernel, device_name, wgsize: params.wgsize })
    }
}

impl ForceIntegrator for ClIntegrator {
    type Buffer = GpuBuffer<Ready>;

    fn name(&self) -> String {
        format!("OpenCL device {}", self.device_name)
    }

    fn upload(&mut self, host: &[Float4]) -> Result<Self::Buffer, NBodyError> {
        GpuBuffer::<Queued>::from_slice(&self.context, &self.queue, cast_slice(host))
    }

    fn download(&mut self, buffer: &Self::Buffer, host: &mut [Float4]) -> Result<(), NBodyError> {
        buffer.read_blocking(&self.queue, cast_slice_mut(host))
    }

    fn integrate(
        &mut self,
        positions_in: &Self::Buffer,
        velocities: &mut Self::Buffer,
        positions_out: &mut Self::Buffer,
        count: usize,
        delta: f32,
        softening: f32,
    ) -> Result<(), NBodyError> {
        let bytes = count * std::mem::size_of::<Float4>();
        for len in [positions_in.len(), velocities.len(), positions_out.len()] {
            if len != bytes {
                return Err(NBodyError::LengthMismatch { expected: bytes, actual: len });
            }
        }
        if count % self.wgsize != 0 {
            return Err(NBodyError::InvalidWorkGroup { count, wgsize: self.wgsize });
        }

        let n = count as cl_uint;
        unsafe {
            self.kernel.set_arg(0, positions_in.raw())?;
            self.kernel.set_arg(1, positions_out.raw())?;
            self.kernel.set_arg(2, velocities.raw())?;
            self.kernel.set_arg(3, &n)?;
            self.kernel.set_arg(4, &delta)?;
            self.kernel.set_arg(5, &softening)?;
        }

        let global = [count, 1, 1];
        let local = [self.wgsize, 1, 1];
        unsafe {
            self.queue.enqueue_nd_range_kernel(
                self.kernel.get(),
                1,
                ptr::null(),
                global.as_ptr(),
                local.as_ptr(),
                &[],
            )?;
        }
        // step barrier
        self.queue.finish()?;
        Ok(())
    }
}
