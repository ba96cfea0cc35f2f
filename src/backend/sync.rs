// Synchronization primitives
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync, and the bookkeeping that
// keeps at most MAX_FRAMES_IN_FLIGHT frames queued on the GPU.

use anyhow::{Context, Result};
use ash::vk;
use super::{VkFailure, VulkanDevice};

/// Number of frames the CPU may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &VulkanDevice) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder()
            .flags(vk::FenceCreateFlags::SIGNALED); // Start signaled

        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
        };

        // Fill one handle at a time so a partial failure can be unwound
        let created = unsafe {
            device.device.create_semaphore(&semaphore_info, None).and_then(|s| {
                sync.image_available = s;
                device.device.create_semaphore(&semaphore_info, None)
            }).and_then(|s| {
                sync.render_finished = s;
                device.device.create_fence(&fence_info, None)
            })
        };

        match created {
            Ok(fence) => {
                sync.in_flight_fence = fence;
                Ok(sync)
            }
            Err(e) => {
                sync.destroy(&device.device);
                Err(e).context(VkFailure::CreateSyncObjects)
            }
        }
    }

    /// Destroying null handles is a no-op
    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_semaphore(self.image_available, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

/// Which frame slot is current, and which slot's fence guards each
/// swapchain image.
///
/// An image can come back from `acquire` while an older frame that rendered
/// into it is still executing; its recorded fence must be waited on first.
#[derive(Debug)]
pub struct FramePacer {
    current_frame: usize,
    images_in_flight: Vec<Option<vk::Fence>>,
}

impl FramePacer {
    pub fn new(image_count: usize) -> Self {
        Self {
            current_frame: 0,
            images_in_flight: vec![None; image_count],
        }
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Record `fence` as the guard of `image_index`, returning the fence that
    /// guarded it before (if any)
    pub fn claim_image(&mut self, image_index: u32, fence: vk::Fence) -> Option<vk::Fence> {
        let slot = self.images_in_flight.get_mut(image_index as usize)?;
        slot.replace(fence)
    }

    pub fn advance(&mut self) {
        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;
    }

    /// Forget every guard; only valid once the device is idle
    pub fn reset_images(&mut self, image_count: usize) {
        self.images_in_flight.clear();
        self.images_in_flight.resize(image_count, None);
    }

    pub fn image_count(&self) -> usize {
        self.images_in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn frame_slots_alternate() {
        let mut pacer = FramePacer::new(3);
        let mut seen = Vec::new();

        for _ in 0..5 {
            seen.push(pacer.current_frame());
            pacer.advance();
        }

        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn claiming_returns_previous_guard() {
        let first = vk::Fence::from_raw(1);
        let second = vk::Fence::from_raw(2);
        let mut pacer = FramePacer::new(3);

        assert_eq!(pacer.claim_image(2, first), None);
        assert_eq!(pacer.claim_image(0, second), None);
        assert_eq!(pacer.claim_image(2, second), Some(first));
        assert_eq!(pacer.claim_image(2, first), Some(second));
    }

    #[test]
    fn out_of_range_image_is_ignored() {
        let mut pacer = FramePacer::new(2);
        assert_eq!(pacer.claim_image(5, vk::Fence::from_raw(1)), None);
        assert_eq!(pacer.image_count(), 2);
    }

    #[test]
    fn reset_clears_and_resizes() {
        let fence = vk::Fence::from_raw(7);
        let mut pacer = FramePacer::new(2);
        pacer.claim_image(1, fence);
        pacer.advance();

        pacer.reset_images(4);

        assert_eq!(pacer.image_count(), 4);
        assert_eq!(pacer.claim_image(1, fence), None);
        // The frame slot is untouched by a swapchain rebuild
        assert_eq!(pacer.current_frame(), 1);
    }
}
