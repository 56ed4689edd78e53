//! Vulkan synchronization primitives and the per-frame sequence
//!
//! A frame always runs in this order, inside [`FrameSync::draw_frame`]:
//!
//! ```text
//! wait in-flight fence -> acquire image -> reset fence -> record
//!     -> submit (signal render-finished) -> present (wait render-finished)
//! ```
//!
//! Callers never see a half-finished frame. Fence waits and image acquisition
//! are bounded by a timeout; running out of time skips the frame instead of
//! failing. If recording or submission fails after the fence reset, an empty
//! submission waits on the acquired image's semaphore and signals the fence
//! again, so the slot is usable on the next frame.

use ash::prelude::VkResult;
use ash::vk;

use super::device::Device;
use super::error::{VulkanError, VulkanResult};
use super::handles::{HandleKind, OwnedFence, OwnedSemaphore};
use super::swapchain::Swapchain;

/// Create a binary semaphore
pub fn create_semaphore(device: &Device) -> VulkanResult<OwnedSemaphore> {
    let create_info = vk::SemaphoreCreateInfo::builder();
    let semaphore = unsafe { device.raw().create_semaphore(&create_info, None) }
        .map_err(|result| VulkanError::creation(HandleKind::Semaphore, result))?;
    Ok(device.own(semaphore))
}

/// Create a fence, optionally already signalled
pub fn create_fence(device: &Device, signaled: bool) -> VulkanResult<OwnedFence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };
    let create_info = vk::FenceCreateInfo::builder().flags(flags);
    let fence = unsafe { device.raw().create_fence(&create_info, None) }
        .map_err(|result| VulkanError::creation(HandleKind::Fence, result))?;
    Ok(device.own(fence))
}

/// What happened to one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Submitted and queued for presentation
    Presented {
        /// Swapchain image used
        image_index: u32,
        /// Swapchain no longer matches the surface exactly
        suboptimal: bool,
    },
    /// Timed out waiting for the GPU or an image; nothing was submitted
    Skipped,
    /// The swapchain must be recreated before the next frame
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Acquired {
    Image { index: u32, suboptimal: bool },
    Skipped,
    OutOfDate,
}

/// Fence wait result: `true` if signalled, `false` on timeout
fn classify_wait(result: VkResult<()>) -> VulkanResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(vk::Result::TIMEOUT) => Ok(false),
        Err(result) => Err(VulkanError::Api(result)),
    }
}

fn classify_acquire(result: VkResult<(u32, bool)>) -> VulkanResult<Acquired> {
    match result {
        Ok((index, suboptimal)) => Ok(Acquired::Image { index, suboptimal }),
        Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Ok(Acquired::Skipped),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
        Err(result) => Err(VulkanError::Api(result)),
    }
}

fn classify_present(result: VkResult<bool>, image_index: u32) -> VulkanResult<FrameOutcome> {
    match result {
        Ok(suboptimal) => Ok(FrameOutcome::Presented {
            image_index,
            suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(FrameOutcome::OutOfDate),
        Err(result) => Err(VulkanError::Api(result)),
    }
}

/// Synchronization handles of one frame slot
#[derive(Debug, Clone, Copy)]
struct SlotHandles {
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
    in_flight: vk::Fence,
}

/// The device calls one frame is made of
trait FrameOps {
    fn wait_for_fence(&mut self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()>;
    fn acquire(&mut self, signal: vk::Semaphore, timeout_ns: u64) -> VkResult<(u32, bool)>;
    fn reset_fence(&mut self, fence: vk::Fence) -> VkResult<()>;
    fn submit(
        &mut self,
        buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<()>;
    fn present(&mut self, wait: vk::Semaphore, image_index: u32) -> VkResult<bool>;
    /// Submit no work: wait on `wait` and signal `fence`
    fn restore(&mut self, wait: vk::Semaphore, fence: vk::Fence) -> VkResult<()>;
}

/// Run one frame; the flag reports whether work was submitted
fn run_frame<O, F>(
    ops: &mut O,
    slot: SlotHandles,
    timeout_ns: u64,
    record: F,
) -> VulkanResult<(FrameOutcome, bool)>
where
    O: FrameOps,
    F: FnOnce(u32) -> VulkanResult<vk::CommandBuffer>,
{
    if !classify_wait(ops.wait_for_fence(slot.in_flight, timeout_ns))? {
        log::debug!("Frame skipped: in-flight fence not signalled in time");
        return Ok((FrameOutcome::Skipped, false));
    }

    let (image_index, acquire_suboptimal) =
        match classify_acquire(ops.acquire(slot.image_available, timeout_ns))? {
            Acquired::Image { index, suboptimal } => (index, suboptimal),
            Acquired::Skipped => {
                log::debug!("Frame skipped: no swapchain image in time");
                return Ok((FrameOutcome::Skipped, false));
            }
            Acquired::OutOfDate => return Ok((FrameOutcome::OutOfDate, false)),
        };

    ops.reset_fence(slot.in_flight).map_err(VulkanError::Api)?;
    let submitted = record(image_index).and_then(|buffer| {
        ops.submit(
            buffer,
            slot.image_available,
            slot.render_finished,
            slot.in_flight,
        )
        .map_err(VulkanError::Api)
    });
    if let Err(error) = submitted {
        if let Err(result) = ops.restore(slot.image_available, slot.in_flight) {
            log::error!("Frame slot could not be restored after {error}: {result:?}");
        }
        return Err(error);
    }

    let outcome = match classify_present(ops.present(slot.render_finished, image_index), image_index)? {
        FrameOutcome::Presented {
            image_index,
            suboptimal,
        } => FrameOutcome::Presented {
            image_index,
            suboptimal: suboptimal || acquire_suboptimal,
        },
        other => other,
    };
    Ok((outcome, true))
}

struct DeviceFrameOps<'a> {
    device: &'a ash::Device,
    swapchain: &'a Swapchain,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
}

impl FrameOps for DeviceFrameOps<'_> {
    fn wait_for_fence(&mut self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) }
    }

    fn acquire(&mut self, signal: vk::Semaphore, timeout_ns: u64) -> VkResult<(u32, bool)> {
        self.swapchain.acquire_next_image(signal, timeout_ns)
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn submit(
        &mut self,
        buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<()> {
        let wait_semaphores = [wait];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let buffers = [buffer];
        let signal_semaphores = [signal];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&buffers)
            .signal_semaphores(&signal_semaphores)
            .build();
        unsafe { self.device.queue_submit(self.graphics_queue, &[submit_info], fence) }
    }

    fn present(&mut self, wait: vk::Semaphore, image_index: u32) -> VkResult<bool> {
        self.swapchain.present(self.present_queue, wait, image_index)
    }

    fn restore(&mut self, wait: vk::Semaphore, fence: vk::Fence) -> VkResult<()> {
        let wait_semaphores = [wait];
        let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .build();
        unsafe { self.device.queue_submit(self.graphics_queue, &[submit_info], fence) }
    }
}

struct FrameSlot {
    image_available: OwnedSemaphore,
    render_finished: OwnedSemaphore,
    in_flight: OwnedFence,
}

impl FrameSlot {
    fn handles(&self) -> SlotHandles {
        SlotHandles {
            image_available: *self.image_available,
            render_finished: *self.render_finished,
            in_flight: *self.in_flight,
        }
    }
}

/// Per-frame-in-flight semaphores and fences, cycled round robin
pub struct FrameSync {
    slots: Vec<FrameSlot>,
    current: usize,
    timeout_ns: u64,
}

impl FrameSync {
    /// Create `frames_in_flight` slots; fences start signalled
    pub fn new(device: &Device, frames_in_flight: usize, timeout_ns: u64) -> VulkanResult<Self> {
        if frames_in_flight == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "at least one frame in flight is required".to_string(),
            });
        }
        let slots = (0..frames_in_flight)
            .map(|_| {
                Ok(FrameSlot {
                    image_available: create_semaphore(device)?,
                    render_finished: create_semaphore(device)?,
                    in_flight: create_fence(device, true)?,
                })
            })
            .collect::<VulkanResult<Vec<_>>>()?;
        Ok(Self {
            slots,
            current: 0,
            timeout_ns,
        })
    }

    /// Frame slot the next [`draw_frame`](Self::draw_frame) will use
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Number of frame slots
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Run one complete frame
    ///
    /// `record` receives the acquired image index and the frame slot and
    /// returns the recorded command buffer to submit.
    pub fn draw_frame<F>(
        &mut self,
        device: &Device,
        swapchain: &Swapchain,
        graphics_queue: vk::Queue,
        present_queue: vk::Queue,
        record: F,
    ) -> VulkanResult<FrameOutcome>
    where
        F: FnOnce(u32, usize) -> VulkanResult<vk::CommandBuffer>,
    {
        let slot_index = self.current;
        let slot = self
            .slots
            .get(slot_index)
            .map(FrameSlot::handles)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("frame slot {slot_index} out of range"),
            })?;

        let mut ops = DeviceFrameOps {
            device: device.raw(),
            swapchain,
            graphics_queue,
            present_queue,
        };
        let (outcome, submitted) =
            run_frame(&mut ops, slot, self.timeout_ns, |image| record(image, slot_index))?;
        if submitted {
            self.current = (self.current + 1) % self.slots.len();
        }
        Ok(outcome)
    }
}
