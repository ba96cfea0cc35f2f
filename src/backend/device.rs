// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with validation layers
// - Window surface
// - Physical device selection (prefer discrete GPU)
// - Logical device + graphics/present queues

use anyhow::{Context, Result};
use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle, RawDisplayHandle};
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;
use winit::window::Window;
use super::swapchain::SurfaceSupport;
use super::VkFailure;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &CStr = c"No Engine";

/// Queue families found while scanning a physical device
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Walk the families in order until both a graphics and a present family
    /// have been seen. `supports_present` asks the surface about one family.
    pub fn find<F>(families: &[vk::QueueFamilyProperties], mut supports_present: F) -> Result<Self>
    where
        F: FnMut(u32) -> Result<bool>,
    {
        let mut indices = Self::default();

        for (i, family) in families.iter().enumerate() {
            let i = i as u32;

            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(i);
            }
            if supports_present(i)? {
                indices.present = Some(i);
            }
            if indices.is_complete() {
                break;
            }
        }

        Ok(indices)
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    pub fn resolve(self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

/// The queue families the logical device was created with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Each family gets exactly one queue create info
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// First candidate with the strictly highest score
pub fn highest_scoring<T>(candidates: impl IntoIterator<Item = (T, u32)>) -> Option<T> {
    let mut best: Option<(T, u32)> = None;
    for (candidate, score) in candidates {
        if best.as_ref().map_or(true, |&(_, best_score)| score > best_score) {
            best = Some((candidate, score));
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Higher is better; suitable devices with equal scores keep enumeration order
pub fn device_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        _ => 1,
    }
}

/// First requested name that is not in `available`
pub fn first_missing<'a>(requested: &[&'a CStr], available: &[&CStr]) -> Option<&'a CStr> {
    requested
        .iter()
        .copied()
        .find(|name| !available.contains(name))
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: khr::Surface,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    pub instance: ash::Instance,
    _entry: Entry,

    // Queue handles
    pub queue_families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
}

impl VulkanDevice {
    /// Create Vulkan device presenting to `window`
    ///
    /// # Arguments
    /// * `app_name` - Application name reported to the driver
    /// * `enable_validation` - Enable Vulkan validation layers (debug only)
    pub fn new(app_name: &str, enable_validation: bool, window: &Window) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan device: {}", app_name);

        let entry = unsafe { Entry::load() }.context(VkFailure::LoadLibrary)?;

        let display_handle = window.raw_display_handle();
        let window_handle = window.raw_window_handle();

        let instance = Self::create_instance(&entry, app_name, display_handle, enable_validation)?;

        // Everything below owns a handle that must be released if a later
        // step fails, so build the device piecewise
        let debug_utils = if enable_validation {
            match Self::setup_debug_messenger(&entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        let surface_loader = khr::Surface::new(&entry, &instance);
        let surface = unsafe {
            ash_window::create_surface(&entry, &instance, display_handle, window_handle, None)
        };
        let surface = match surface {
            Ok(surface) => surface,
            Err(e) => {
                unsafe {
                    if let Some((utils, messenger)) = &debug_utils {
                        utils.destroy_debug_utils_messenger(*messenger, None);
                    }
                    instance.destroy_instance(None);
                }
                return Err(e).context(VkFailure::CreateSurface);
            }
        };

        let picked = Self::pick_physical_device(&instance, &surface_loader, surface)
            .and_then(|(physical_device, families)| {
                let device = Self::create_logical_device(
                    &instance,
                    physical_device,
                    families,
                    enable_validation,
                )?;
                Ok((physical_device, families, device))
            });

        let (physical_device, queue_families, device) = match picked {
            Ok(picked) => picked,
            Err(e) => {
                unsafe {
                    surface_loader.destroy_surface(surface, None);
                    if let Some((utils, messenger)) = &debug_utils {
                        utils.destroy_debug_utils_messenger(*messenger, None);
                    }
                    instance.destroy_instance(None);
                }
                return Err(e);
            }
        };

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

        log::debug!(
            "Queue families: graphics={} present={}",
            queue_families.graphics,
            queue_families.present
        );

        Ok(Arc::new(Self {
            device,
            physical_device,
            surface,
            surface_loader,
            debug_utils,
            instance,
            _entry: entry,
            queue_families,
            graphics_queue,
            present_queue,
        }))
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        display_handle: RawDisplayHandle,
        enable_validation: bool,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(crate_version())
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        // Surface extensions for whatever window system we are running on
        let mut extensions: Vec<&CStr> = ash_window::enumerate_required_extensions(display_handle)
            .context(VkFailure::InstanceExtensionNotFound)?
            .iter()
            .map(|&name| unsafe { CStr::from_ptr(name) })
            .collect();

        let layers: Vec<&CStr> = if enable_validation {
            Self::check_validation_layer_support(entry)?;
            extensions.push(DebugUtils::name());
            vec![VALIDATION_LAYER]
        } else {
            Vec::new()
        };

        Self::check_instance_extensions(entry, &extensions)?;

        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

        // Chained so instance creation and destruction are validated as well
        let mut debug_info = debug_messenger_create_info();

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        if enable_validation {
            create_info = create_info.push_next(&mut debug_info);
        }

        unsafe { entry.create_instance(&create_info, None) }.context(VkFailure::CreateInstance)
    }

    fn check_instance_extensions(entry: &Entry, extensions: &[&CStr]) -> Result<()> {
        let properties = entry
            .enumerate_instance_extension_properties(None)
            .context(VkFailure::InstanceExtensionNotFound)?;
        let available: Vec<&CStr> = properties
            .iter()
            .map(|p| unsafe { CStr::from_ptr(p.extension_name.as_ptr()) })
            .collect();

        if let Some(missing) = first_missing(extensions, &available) {
            log::error!("Missing requested instance extension: {}", missing.to_string_lossy());
            return Err(VkFailure::InstanceExtensionNotFound.into());
        }

        log::trace!("Instance extensions enabled:");
        for extension in extensions {
            log::trace!("\t{}", extension.to_string_lossy());
        }

        Ok(())
    }

    fn check_validation_layer_support(entry: &Entry) -> Result<()> {
        let properties = entry
            .enumerate_instance_layer_properties()
            .context(VkFailure::ValidationLayerNotFound)?;
        let available: Vec<&CStr> = properties
            .iter()
            .map(|p| unsafe { CStr::from_ptr(p.layer_name.as_ptr()) })
            .collect();

        if let Some(missing) = first_missing(&[VALIDATION_LAYER], &available) {
            log::error!("Missing requested validation layer: {}", missing.to_string_lossy());
            return Err(VkFailure::ValidationLayerNotFound.into());
        }

        log::trace!("Validation layers enabled:");
        log::trace!("\t{}", VALIDATION_LAYER.to_string_lossy());

        Ok(())
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);
        let create_info = debug_messenger_create_info();

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context(VkFailure::SetupDebugMessenger)?;

        Ok((debug_utils, messenger))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .context(VkFailure::PhysicalDeviceNotFound)?;

        if devices.is_empty() {
            return Err(VkFailure::PhysicalDeviceNotFound.into());
        }

        let mut suitable = Vec::with_capacity(devices.len());
        for &device in &devices {
            if let Some(families) = Self::check_device(instance, surface_loader, surface, device)? {
                let props = unsafe { instance.get_physical_device_properties(device) };
                suitable.push(((device, families), device_score(props.device_type)));
            }
        }

        // Equal scores keep enumeration order: the first suitable device wins
        let best = highest_scoring(suitable);

        log::info!("Devices found:");
        for &device in &devices {
            let props = unsafe { instance.get_physical_device_properties(device) };
            let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy();
            let selected = best.is_some_and(|(chosen, _)| chosen == device);
            log::info!("\t{} {}", name, if selected { "(Selected)" } else { "" });
        }

        best.context(VkFailure::PhysicalDeviceNotSuitable)
    }

    /// Returns the queue families when the device can drive our swapchain
    fn check_device(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
        device: vk::PhysicalDevice,
    ) -> Result<Option<QueueFamilies>> {
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        let indices = QueueFamilyIndices::find(&queue_families, |family| unsafe {
            surface_loader
                .get_physical_device_surface_support(device, family, surface)
                .context(VkFailure::QuerySurface)
        })?;

        let Some(families) = indices.resolve() else {
            return Ok(None);
        };

        let properties = unsafe { instance.enumerate_device_extension_properties(device) }
            .context(VkFailure::QuerySurface)?;
        let available: Vec<&CStr> = properties
            .iter()
            .map(|p| unsafe { CStr::from_ptr(p.extension_name.as_ptr()) })
            .collect();

        if first_missing(&[khr::Swapchain::name()], &available).is_some() {
            return Ok(None);
        }

        let support = SurfaceSupport::query(surface_loader, device, surface)?;
        Ok(support.is_adequate().then_some(families))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        families: QueueFamilies,
        enable_validation: bool,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions = [khr::Swapchain::name().as_ptr()];
        let layers: Vec<*const c_char> = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context(VkFailure::CreateLogicalDevice)?;

        log::trace!("Device extensions enabled:");
        log::trace!("\t{}", khr::Swapchain::name().to_string_lossy());

        Ok(device)
    }

    pub fn surface_support(&self) -> Result<SurfaceSupport> {
        SurfaceSupport::query(&self.surface_loader, self.physical_device, self.surface)
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.context(VkFailure::DeviceWaitIdle)
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        let _ = self.wait_idle();

        // Cleanup in reverse order
        unsafe {
            self.device.destroy_device(None);

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
    }
}

fn crate_version() -> u32 {
    let part = |s: &str| s.parse().unwrap_or(0);
    vk::make_api_version(
        0,
        part(env!("CARGO_PKG_VERSION_MAJOR")),
        part(env!("CARGO_PKG_VERSION_MINOR")),
        part(env!("CARGO_PKG_VERSION_PATCH")),
    )
}

fn debug_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

fn message_type_label(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }

    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();
    let label = message_type_label(message_type);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[{}] {}", label, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[{}] {}", label, message),
        _ => {}
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn one_family_does_everything() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let indices = QueueFamilyIndices::find(&families, |_| Ok(true)).unwrap();

        let resolved = indices.resolve().unwrap();
        assert_eq!(resolved, QueueFamilies { graphics: 0, present: 0 });
        assert!(resolved.is_shared());
        assert_eq!(resolved.unique(), vec![0]);
    }

    #[test]
    fn present_on_a_separate_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = QueueFamilyIndices::find(&families, |i| Ok(i == 1)).unwrap();

        let resolved = indices.resolve().unwrap();
        assert_eq!(resolved, QueueFamilies { graphics: 0, present: 1 });
        assert!(!resolved.is_shared());
        assert_eq!(resolved.unique(), vec![0, 1]);
    }

    #[test]
    fn scan_stops_once_complete() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let mut asked = Vec::new();
        let indices = QueueFamilyIndices::find(&families, |i| {
            asked.push(i);
            Ok(true)
        })
        .unwrap();

        assert_eq!(indices.graphics, Some(0));
        assert_eq!(asked, vec![0]);
    }

    #[test]
    fn no_present_support_is_incomplete() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let indices = QueueFamilyIndices::find(&families, |_| Ok(false)).unwrap();

        assert!(!indices.is_complete());
        assert!(indices.resolve().is_none());
    }

    #[test]
    fn surface_query_errors_propagate() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let err = QueueFamilyIndices::find(&families, |_| {
            Err(vk::Result::ERROR_SURFACE_LOST_KHR).context(VkFailure::QuerySurface)
        })
        .unwrap_err();

        assert_eq!(err.downcast_ref::<VkFailure>(), Some(&VkFailure::QuerySurface));
    }

    #[test]
    fn discrete_gpus_score_highest() {
        assert!(
            device_score(vk::PhysicalDeviceType::DISCRETE_GPU)
                > device_score(vk::PhysicalDeviceType::INTEGRATED_GPU)
        );
        assert!(
            device_score(vk::PhysicalDeviceType::INTEGRATED_GPU)
                > device_score(vk::PhysicalDeviceType::CPU)
        );
    }

    #[test]
    fn equal_scores_keep_the_first_device() {
        let integrated = device_score(vk::PhysicalDeviceType::INTEGRATED_GPU);
        let discrete = device_score(vk::PhysicalDeviceType::DISCRETE_GPU);

        assert_eq!(highest_scoring([("a", integrated), ("b", integrated)]), Some("a"));
        assert_eq!(
            highest_scoring([("a", integrated), ("b", discrete), ("c", discrete)]),
            Some("b")
        );
        assert_eq!(highest_scoring(Vec::<(&str, u32)>::new()), None);
    }

    #[test]
    fn missing_names_are_reported() {
        let available = [c"VK_KHR_surface", c"VK_KHR_xcb_surface"];

        assert_eq!(first_missing(&[c"VK_KHR_surface"], &available), None);
        assert_eq!(
            first_missing(&[c"VK_KHR_surface", c"VK_EXT_debug_utils"], &available),
            Some(c"VK_EXT_debug_utils")
        );
    }

    #[test]
    fn message_types_get_labels() {
        assert_eq!(message_type_label(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION), "Validation");
        assert_eq!(message_type_label(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE), "Performance");
        assert_eq!(message_type_label(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL), "General");
    }
}
