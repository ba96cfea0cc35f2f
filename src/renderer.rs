// =============================================================================
// RENDERER - owns every GPU object and drives one frame at a time
// =============================================================================
//
// FRAME FLOW:
// 1. Wait for this frame slot's fence (the frame that used it last is done)
// 2. Acquire a swapchain image
// 3. Wait for whichever frame is still rendering into that image
// 4. Submit the image's pre-recorded command buffer
// 5. Present, rebuilding the swapchain if it went stale or the window resized
// 6. Advance to the other frame slot
//
// Swapchain-dependent objects live in `PresentTarget` and are thrown away and
// rebuilt as a unit. Everything else lives as long as the renderer.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::backend::commands::{create_command_pool, record_command_buffers, DrawTarget};
use crate::backend::pipeline::{create_framebuffers, create_graphics_pipeline, create_render_pass};
use crate::backend::shader::ShaderCode;
use crate::backend::swapchain::{Acquired, Presented};
use crate::backend::sync::{FramePacer, FrameSync, MAX_FRAMES_IN_FLIGHT};
use crate::backend::{Swapchain, VkFailure, VulkanDevice};

/// What the renderer needs from the configuration
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub app_name: String,
    pub enable_validation: bool,
    pub present_mode: vk::PresentModeKHR,
    pub clear_color: [f32; 4],
}

/// What happened during a call to `draw_frame`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// An image was submitted and presented
    Presented,
    /// The swapchain was rebuilt instead of drawing; try again next iteration
    Recreated,
    /// The window has no area, nothing to draw into
    Skipped,
}

// =============================================================================
// SWAPCHAIN-DEPENDENT OBJECTS
// =============================================================================

/// Swapchain plus everything whose shape depends on it.
///
/// Drop releases them in reverse creation order; the swapchain field itself
/// (image views, then the swapchain) goes last.
struct PresentTarget {
    command_buffers: Vec<vk::CommandBuffer>,
    command_pool: vk::CommandPool,
    framebuffers: Vec<vk::Framebuffer>,
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    swapchain: Swapchain,
    device: Arc<VulkanDevice>,
}

impl PresentTarget {
    fn new(
        device: &Arc<VulkanDevice>,
        command_pool: vk::CommandPool,
        shaders: &ShaderCode,
        settings: &RenderSettings,
        size: PhysicalSize<u32>,
    ) -> Result<Self> {
        let swapchain = Swapchain::new(
            device.clone(),
            settings.present_mode,
            size.width,
            size.height,
        )?;

        // Filled in step by step; an early return drops whatever exists so far
        let mut target = Self {
            command_buffers: Vec::new(),
            command_pool,
            framebuffers: Vec::new(),
            pipeline: vk::Pipeline::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            render_pass: vk::RenderPass::null(),
            swapchain,
            device: device.clone(),
        };

        let extent = target.swapchain.extent;

        target.render_pass = create_render_pass(device, target.swapchain.format)?;

        let (pipeline, pipeline_layout) =
            create_graphics_pipeline(device, target.render_pass, extent, shaders)?;
        target.pipeline = pipeline;
        target.pipeline_layout = pipeline_layout;

        target.framebuffers = create_framebuffers(
            device,
            &target.swapchain.image_views,
            target.render_pass,
            extent,
        )?;

        target.command_buffers = record_command_buffers(
            device,
            command_pool,
            &DrawTarget {
                render_pass: target.render_pass,
                pipeline: target.pipeline,
                framebuffers: &target.framebuffers,
                extent,
                clear_color: settings.clear_color,
            },
        )?;

        Ok(target)
    }

    fn image_count(&self) -> usize {
        self.swapchain.images.len()
    }
}

impl Drop for PresentTarget {
    fn drop(&mut self) {
        let device = &self.device.device;

        unsafe {
            for &framebuffer in &self.framebuffers {
                device.destroy_framebuffer(framebuffer, None);
            }

            if !self.command_buffers.is_empty() {
                device.free_command_buffers(self.command_pool, &self.command_buffers);
            }

            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.destroy_render_pass(self.render_pass, None);
        }
    }
}

// =============================================================================
// RENDERER
// =============================================================================

/// IMPORTANT: the device field is declared last so it outlives everything
/// that was created from it.
pub struct Renderer {
    target: Option<PresentTarget>,
    frame_sync: Vec<FrameSync>,
    pacer: FramePacer,
    command_pool: vk::CommandPool,
    shaders: ShaderCode,
    settings: RenderSettings,
    /// Set by the window when it changes size, consumed after the next present
    framebuffer_resized: bool,
    wait_stages: [vk::PipelineStageFlags; 1],
    device: Arc<VulkanDevice>,
}

impl Renderer {
    /// Run the whole setup sequence against `window`
    pub fn new(window: &Window, settings: RenderSettings) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let shaders = ShaderCode::load()?;
        let device = VulkanDevice::new(&settings.app_name, settings.enable_validation, window)?;

        // Outlives every swapchain, so it is created once up front
        let command_pool = create_command_pool(&device)?;

        let mut renderer = Self {
            target: None,
            frame_sync: Vec::with_capacity(MAX_FRAMES_IN_FLIGHT),
            pacer: FramePacer::new(0),
            command_pool,
            shaders,
            settings,
            framebuffer_resized: false,
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            device,
        };

        renderer.recreate_swapchain(window.inner_size())?;

        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            let sync = FrameSync::new(&renderer.device)?;
            renderer.frame_sync.push(sync);
        }

        log::info!("Vulkan initialized successfully!");
        Ok(renderer)
    }

    /// Note that the window size changed; the swapchain is rebuilt after the
    /// next present
    pub fn request_resize(&mut self) {
        self.framebuffer_resized = true;
    }

    /// Render a single frame.
    ///
    /// `size` is the window's current inner size. Any error returned here is
    /// fatal; stale swapchains are handled internally.
    pub fn draw_frame(&mut self, size: PhysicalSize<u32>) -> Result<FrameOutcome> {
        if size.width == 0 || size.height == 0 {
            return Ok(FrameOutcome::Skipped);
        }

        // Minimized earlier, or a rebuild was skipped for lack of area
        if self.target.is_none() {
            self.recreate_swapchain(size)?;
            return Ok(FrameOutcome::Recreated);
        }

        let device = self.device.clone();
        let sync = &self.frame_sync[self.pacer.current_frame()];
        let image_available = sync.image_available;
        let render_finished = sync.render_finished;
        let in_flight_fence = sync.in_flight_fence;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Wait until this frame slot is free again
        // ─────────────────────────────────────────────────────────────────────
        unsafe { device.device.wait_for_fences(&[in_flight_fence], true, u64::MAX) }
            .context(VkFailure::WaitForFences)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Acquire next swapchain image
        // ─────────────────────────────────────────────────────────────────────
        let acquired = self
            .target
            .as_ref()
            .context("Swapchain not initialized")?
            .swapchain
            .acquire_next_image(u64::MAX, image_available)?;

        let image_index = match acquired {
            Acquired::Image { index, suboptimal } => {
                // Still presentable; rebuilt after present below
                if suboptimal {
                    log::debug!("Acquired image from a suboptimal swapchain");
                }
                index
            }
            Acquired::OutOfDate => {
                // The fence was not reset, so this slot stays usable
                self.recreate_swapchain(size)?;
                return Ok(FrameOutcome::Recreated);
            }
        };

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Wait for the older frame still rendering into this image
        // ─────────────────────────────────────────────────────────────────────
        if let Some(previous) = self.pacer.claim_image(image_index, in_flight_fence) {
            if previous != in_flight_fence {
                unsafe { device.device.wait_for_fences(&[previous], true, u64::MAX) }
                    .context(VkFailure::WaitForFences)?;
            }
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Submit command buffer
        // ─────────────────────────────────────────────────────────────────────
        let target = self.target.as_ref().context("Swapchain not initialized")?;
        let cmd = *target
            .command_buffers
            .get(image_index as usize)
            .context(VkFailure::AcquireImage)?;

        let wait_semaphores = [image_available];
        let signal_semaphores = [render_finished];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)      // Wait for image to be available
            .wait_dst_stage_mask(&self.wait_stages) // Which stage waits
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores); // Signal when done

        unsafe {
            device
                .device
                .reset_fences(&[in_flight_fence])
                .context(VkFailure::ResetFences)?;

            device
                .device
                .queue_submit(device.graphics_queue, &[submit_info.build()], in_flight_fence)
                .context(VkFailure::QueueSubmit)?;
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Present the image
        // ─────────────────────────────────────────────────────────────────────
        let presented = target
            .swapchain
            .present(device.present_queue, image_index, &signal_semaphores)?;

        if presented == Presented::Stale || self.framebuffer_resized {
            self.framebuffer_resized = false;
            self.recreate_swapchain(size)?;
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 6: Advance to next frame
        // ─────────────────────────────────────────────────────────────────────
        self.pacer.advance();

        Ok(FrameOutcome::Presented)
    }

    /// Tear down and rebuild the swapchain and everything that depends on it.
    ///
    /// With a zero-sized window the old objects are still released, and the
    /// rebuild happens on the first frame that has area again.
    fn recreate_swapchain(&mut self, size: PhysicalSize<u32>) -> Result<()> {
        // Nothing may still be using the objects about to be destroyed
        self.device.wait_idle()?;
        self.target = None;

        if size.width == 0 || size.height == 0 {
            log::debug!("Window has no area, postponing swapchain creation");
            return Ok(());
        }

        log::info!("Building swapchain resources for {}x{}", size.width, size.height);

        let target = PresentTarget::new(
            &self.device,
            self.command_pool,
            &self.shaders,
            &self.settings,
            size,
        )?;

        self.pacer.reset_images(target.image_count());
        self.target = Some(target);

        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        // Wait for GPU to finish before destroying anything
        let _ = self.device.wait_idle();

        // Destroy in reverse order of creation
        self.target = None;

        for sync in &self.frame_sync {
            sync.destroy(&self.device.device);
        }

        unsafe {
            self.device.device.destroy_command_pool(self.command_pool, None);
        }

        // The device (and with it surface and instance) goes when the last
        // Arc drops, right after this
    }
}
