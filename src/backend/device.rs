// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with validation layers
// - Presentation surface for the window
// - Physical device selection (prefer discrete GPU, must present)
// - Logical device + queue creation
// - Memory allocator setup

use anyhow::{Context, Result};
use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{c_char, CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::Arc;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Depth formats in order of preference
const DEPTH_FORMATS: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    // Dropped by hand before the device goes away
    pub allocator: ManuallyDrop<Mutex<Allocator>>,
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,
    _entry: Entry,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,

    // Presentation
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,

    // Debug utils (if validation enabled)
    debug_utils: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,

    pub depth_format: vk::Format,
}

impl VulkanDevice {
    /// Create Vulkan device
    ///
    /// # Arguments
    /// * `app_name` - Application name for debugging
    /// * `enable_validation` - Enable Vulkan validation layers (debug only)
    /// * `display` / `window` - Raw handles of the window to present to
    pub fn new(
        app_name: &str,
        enable_validation: bool,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan device: {}", app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        // Step 2: Create instance
        let enable_validation = enable_validation && Self::validation_available(&entry)?;
        let instance = Self::create_instance(&entry, app_name, enable_validation, display)?;

        // Step 3: Setup debug messenger if validation enabled
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

        // Step 4: Create surface (platform-specific window connection)
        let surface_loader = surface::Instance::new(&entry, &instance);
        let surface =
            match unsafe { ash_window::create_surface(&entry, &instance, display, window, None) }
                .context("Failed to create window surface")
            {
                Ok(surface) => surface,
                Err(e) => {
                    unsafe { destroy_instance(&instance, &surface_loader, None, debug_utils) };
                    return Err(e);
                }
            };

        // Step 5: Pick physical device (GPU) and its depth format
        let picked = Self::pick_physical_device(&instance, &surface_loader, surface).and_then(
            |(physical_device, family)| {
                let depth_format = Self::find_depth_format(&instance, physical_device)?;
                Ok((physical_device, family, depth_format))
            },
        );
        let (physical_device, graphics_queue_family, depth_format) = match picked {
            Ok(picked) => picked,
            Err(e) => {
                unsafe { destroy_instance(&instance, &surface_loader, Some(surface), debug_utils) };
                return Err(e);
            }
        };

        // Step 6: Create logical device
        let (device, graphics_queue) =
            match Self::create_logical_device(&instance, physical_device, graphics_queue_family) {
                Ok(created) => created,
                Err(e) => {
                    unsafe {
                        destroy_instance(&instance, &surface_loader, Some(surface), debug_utils)
                    };
                    return Err(e);
                }
            };

        // Step 7: Report what we picked
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log::debug!("Depth format: {:?}", depth_format);

        // Step 8: Create memory allocator
        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .context("Failed to create GPU allocator")
        {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe {
                    device.destroy_device(None);
                    destroy_instance(&instance, &surface_loader, Some(surface), debug_utils);
                }
                return Err(e);
            }
        };

        Ok(Arc::new(Self {
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            device,
            physical_device,
            instance,
            _entry: entry,
            graphics_queue,
            graphics_queue_family,
            surface_loader,
            surface,
            debug_utils,
            depth_format,
        }))
    }

    fn validation_available(entry: &Entry) -> Result<bool> {
        let layers = unsafe { entry.enumerate_instance_layer_properties() }?;
        let found = layers
            .iter()
            .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);
        if !found {
            log::warn!("{:?} not installed, running without validation", VALIDATION_LAYER);
        }
        Ok(found)
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        enable_validation: bool,
        display: RawDisplayHandle,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = c"cube-harness";

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        // Surface extensions for whatever windowing system we run on
        let mut extensions: Vec<*const c_char> = ash_window::enumerate_required_extensions(display)
            .context("Window system is not supported by Vulkan")?
            .to_vec();
        if enable_validation {
            extensions.push(debug_utils::NAME.as_ptr());
        }

        // Validation layers
        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let loader = debug_utils::Instance::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }?;

        Ok((loader, messenger))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let devices = unsafe { instance.enumerate_physical_devices() }?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        // Score each device
        let mut best_device = None;
        let mut best_score = 0;

        for device in devices {
            let props = unsafe { instance.get_physical_device_properties(device) };

            if !Self::supports_swapchain(instance, device)? {
                continue;
            }

            // One family for both graphics and present keeps submission simple
            let queue_families =
                unsafe { instance.get_physical_device_queue_family_properties(device) };

            let mut family = None;
            for (i, props) in queue_families.iter().enumerate() {
                let index = i as u32;
                let presents = unsafe {
                    surface_loader.get_physical_device_surface_support(device, index, surface)
                }?;
                if props.queue_flags.contains(vk::QueueFlags::GRAPHICS) && presents {
                    family = Some(index);
                    break;
                }
            }

            if let Some(family) = family {
                let score = device_score(props.device_type);
                if score > best_score {
                    best_score = score;
                    best_device = Some((device, family));
                }
            }
        }

        best_device.ok_or_else(|| anyhow::anyhow!("No GPU can render and present to this window"))
    }

    fn supports_swapchain(instance: &ash::Instance, device: vk::PhysicalDevice) -> Result<bool> {
        let extensions = unsafe { instance.enumerate_device_extension_properties(device) }?;
        Ok(has_extension(&extensions, swapchain::NAME))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_queue_family: u32,
    ) -> Result<(ash::Device, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(graphics_queue_family)
            .queue_priorities(&queue_priorities);

        // Required device extensions
        let extensions = [swapchain::NAME.as_ptr()];
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };

        Ok((device, graphics_queue))
    }

    fn find_depth_format(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
    ) -> Result<vk::Format> {
        DEPTH_FORMATS
            .iter()
            .copied()
            .find(|&format| {
                let props = unsafe {
                    instance.get_physical_device_format_properties(physical_device, format)
                };
                props
                    .optimal_tiling_features
                    .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            })
            .context("No supported depth format")
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

fn has_extension(extensions: &[vk::ExtensionProperties], name: &CStr) -> bool {
    extensions.iter().any(|ext| {
        let ext_name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
        ext_name == name
    })
}

/// Tear down instance-level objects, surface and messenger included
///
/// # Safety
/// Nothing created from `instance` may still be alive apart from `surface`
/// and the messenger.
unsafe fn destroy_instance(
    instance: &ash::Instance,
    surface_loader: &surface::Instance,
    surface: Option<vk::SurfaceKHR>,
    debug_utils: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
) {
    if let Some(surface) = surface {
        surface_loader.destroy_surface(surface, None);
    }
    if let Some((loader, messenger)) = debug_utils {
        loader.destroy_debug_utils_messenger(messenger, None);
    }
    instance.destroy_instance(None);
}

/// Prefer discrete GPUs, then integrated, then anything else
fn device_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 10,
        _ => 1,
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        let _ = self.wait_idle();

        // Cleanup in reverse order
        unsafe {
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
            destroy_instance(
                &self.instance,
                &self.surface_loader,
                Some(self.surface),
                self.debug_utils.take(),
            );
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan {:?}] {}", message_type, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan {:?}] {}", message_type, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::debug!("[Vulkan {:?}] {}", message_type, message);
        }
        _ => {
            log::trace!("[Vulkan {:?}] {}", message_type, message);
        }
    }

    vk::FALSE
}
