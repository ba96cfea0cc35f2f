// Command pool and pre-recorded command buffers
//
// The scene never changes, so each swapchain image gets one command buffer
// recorded up front and resubmitted every frame. They are re-recorded only
// when the swapchain is rebuilt.

use anyhow::{Context, Result};
use ash::vk;
use super::{VkFailure, VulkanDevice};

pub fn create_command_pool(device: &VulkanDevice) -> Result<vk::CommandPool> {
    // No RESET flag: buffers are freed and reallocated wholesale on rebuild
    let pool_info = vk::CommandPoolCreateInfo::builder()
        .queue_family_index(device.queue_families.graphics)
        .flags(vk::CommandPoolCreateFlags::empty());

    unsafe { device.device.create_command_pool(&pool_info, None) }
        .context(VkFailure::CreateCommandPool)
}

/// Everything a triangle draw needs to know about the current swapchain
pub struct DrawTarget<'a> {
    pub render_pass: vk::RenderPass,
    pub pipeline: vk::Pipeline,
    pub framebuffers: &'a [vk::Framebuffer],
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
}

/// Allocate one primary command buffer per framebuffer and record the draw
pub fn record_command_buffers(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    target: &DrawTarget<'_>,
) -> Result<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(target.framebuffers.len() as u32);

    let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }
        .context(VkFailure::AllocateCommandBuffers)?;

    for (&cmd, &framebuffer) in command_buffers.iter().zip(target.framebuffers) {
        if let Err(e) = record_draw(&device.device, cmd, framebuffer, target) {
            unsafe { device.device.free_command_buffers(command_pool, &command_buffers) };
            return Err(e);
        }
    }

    log::debug!("Recorded {} command buffers", command_buffers.len());

    Ok(command_buffers)
}

fn record_draw(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    framebuffer: vk::Framebuffer,
    target: &DrawTarget<'_>,
) -> Result<()> {
    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: target.clear_color,
        },
    }];

    let render_pass_info = vk::RenderPassBeginInfo::builder()
        .render_pass(target.render_pass)
        .framebuffer(framebuffer)
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: target.extent,
        })
        .clear_values(&clear_values);

    unsafe {
        let begin_info = vk::CommandBufferBeginInfo::builder();
        device
            .begin_command_buffer(cmd, &begin_info)
            .context(VkFailure::BeginCommandBuffer)?;

        device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, target.pipeline);
        device.cmd_draw(cmd, 3, 1, 0, 0);
        device.cmd_end_render_pass(cmd);

        device
            .end_command_buffer(cmd)
            .context(VkFailure::EndCommandBuffer)?;
    }

    Ok(())
}
